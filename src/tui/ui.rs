//! UI rendering for the front panel.

use super::app::FrontPanelApp;
use crate::cpu::MEMORY_SIZE;
use ratatui::{
    prelude::*,
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, List, ListItem, Paragraph},
};

/// Main draw function.
pub fn draw(frame: &mut Frame, app: &FrontPanelApp) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(frame.area());

    // Left side: code, registers, status
    let left_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(10),
            Constraint::Length(9),
            Constraint::Length(3),
        ])
        .split(chunks[0]);

    draw_disassembly(frame, left_chunks[0], app);
    draw_registers(frame, left_chunks[1], app);
    draw_status(frame, left_chunks[2], app);

    // Right side: memory, output console, help
    let right_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(10),
            Constraint::Length(5),
            Constraint::Length(5),
        ])
        .split(chunks[1]);

    draw_memory(frame, right_chunks[0], app);
    draw_output(frame, right_chunks[1], app);
    draw_help(frame, right_chunks[2]);
}

/// Draw the disassembly view around PC.
fn draw_disassembly(frame: &mut Frame, area: Rect, app: &FrontPanelApp) {
    let disasm = app.get_disassembly((area.height as usize).saturating_sub(2));

    let items: Vec<ListItem> = disasm
        .iter()
        .map(|(addr, text, is_current)| {
            let prefix = if *is_current { "▶ " } else { "  " };
            let style = if *is_current {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            ListItem::new(format!("{}{:03X}: {}", prefix, addr, text)).style(style)
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .title(" Program ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );

    frame.render_widget(list, area);
}

/// Draw registers and flags.
fn draw_registers(frame: &mut Frame, area: Rect, app: &FrontPanelApp) {
    let regs = &app.cpu.regs;

    let content = vec![
        Line::from(vec![
            Span::raw("AC: "),
            Span::styled(format!("{:04X}", regs.ac), Style::default().fg(Color::White)),
            Span::raw("  DR: "),
            Span::styled(format!("{:04X}", regs.dr), Style::default().fg(Color::White)),
            Span::raw("  IR: "),
            Span::styled(format!("{:04X}", regs.ir), Style::default().fg(Color::White)),
            Span::raw("  TR: "),
            Span::styled(format!("{:04X}", regs.tr), Style::default().fg(Color::White)),
        ]),
        Line::from(vec![
            Span::raw("PC: "),
            Span::styled(format!("{:03X}", regs.pc), Style::default().fg(Color::Yellow)),
            Span::raw("   AR: "),
            Span::styled(format!("{:03X}", regs.ar), Style::default().fg(Color::White)),
            Span::raw("   SC: "),
            Span::styled(format!("T{}", regs.sc), Style::default().fg(Color::Cyan)),
            Span::raw("   E: "),
            Span::styled(format!("{}", u8::from(regs.e)), flag_style(regs.e)),
            Span::raw("  I: "),
            Span::styled(format!("{}", u8::from(regs.i)), flag_style(regs.i)),
        ]),
        Line::from(vec![
            Span::raw("S: "),
            Span::styled(format!("{}", u8::from(regs.s)), flag_style(regs.s)),
            Span::raw("  IEN: "),
            Span::styled(format!("{}", u8::from(regs.ien)), flag_style(regs.ien)),
            Span::raw("  FGI: "),
            Span::styled(format!("{}", u8::from(regs.fgi)), flag_style(regs.fgi)),
            Span::raw("  FGO: "),
            Span::styled(format!("{}", u8::from(regs.fgo)), flag_style(regs.fgo)),
            Span::raw("  R: "),
            Span::styled(format!("{}", u8::from(regs.r)), flag_style(regs.r)),
        ]),
        Line::from(vec![
            Span::raw("INPR: "),
            Span::styled(format!("{:02X}", regs.inpr), Style::default().fg(Color::White)),
            Span::raw("  OUTR: "),
            Span::styled(format!("{:02X}", regs.outr), Style::default().fg(Color::White)),
        ]),
        Line::from(vec![
            Span::raw("Micro-ops: "),
            Span::styled(format!("{}", app.cpu.steps), Style::default().fg(Color::Cyan)),
            Span::raw("   State: "),
            Span::styled(
                format!("{:?}", app.cpu.state),
                if app.cpu.is_running() {
                    Style::default().fg(Color::Green)
                } else {
                    Style::default().fg(Color::Red)
                },
            ),
        ]),
    ];

    let paragraph = Paragraph::new(content).block(
        Block::default()
            .title(" Registers ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Green)),
    );

    frame.render_widget(paragraph, area);
}

/// Draw the memory view.
fn draw_memory(frame: &mut Frame, area: Rect, app: &FrontPanelApp) {
    let visible_rows = (area.height as usize).saturating_sub(2);
    let start = app.mem_scroll;
    let end = (start + visible_rows).min(MEMORY_SIZE);

    let items: Vec<ListItem> = (start..end)
        .map(|addr| {
            let word = app.cpu.mem.read(addr as u16);
            let is_pc = addr as u16 == app.cpu.regs.pc;

            let text = format!("{:03X}: {:04X}", addr, word);
            let style = if is_pc {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else if word != 0 {
                Style::default().fg(Color::White)
            } else {
                Style::default().fg(Color::DarkGray)
            };

            ListItem::new(text).style(style)
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .title(" Memory ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Magenta)),
    );

    frame.render_widget(list, area);
}

/// Draw the output console.
fn draw_output(frame: &mut Frame, area: Rect, app: &FrontPanelApp) {
    let output = app.output.borrow();
    let paragraph = Paragraph::new(output.as_str())
        .style(Style::default().fg(Color::White))
        .block(
            Block::default()
                .title(" Output ")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Blue)),
        );

    frame.render_widget(paragraph, area);
}

/// Draw the status bar.
fn draw_status(frame: &mut Frame, area: Rect, app: &FrontPanelApp) {
    let status = Paragraph::new(app.status.clone())
        .style(Style::default().fg(Color::White))
        .block(Block::default().title(" Status ").borders(Borders::ALL));

    frame.render_widget(status, area);
}

/// Draw the help panel.
fn draw_help(frame: &mut Frame, area: Rect) {
    let help = Paragraph::new(vec![
        Line::from("s: Step  r: Run  p: Pause  x: Reset"),
        Line::from("↑↓: Scroll memory  q/Esc: Quit"),
        Line::from("While waiting for input: type a character"),
    ])
    .style(Style::default().fg(Color::DarkGray))
    .block(Block::default().title(" Help ").borders(Borders::ALL));

    frame.render_widget(help, area);
}

fn flag_style(set: bool) -> Style {
    if set {
        Style::default().fg(Color::Green)
    } else {
        Style::default().fg(Color::DarkGray)
    }
}
