// src/tui/mod.rs
use crate::core::gate::{self, GateDecision, GateInputs};
use crate::types::{DeskCommand, DeskSnapshot, MarkPrice, RiskLevel, Side, UiEvent};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph, Sparkline},
    Terminal,
};
use std::collections::VecDeque;
use std::{io, time::Duration};
use tokio::sync::mpsc;

const MAX_LOGS: usize = 20;
const CHART_POINTS: usize = 50;

pub struct App {
    pub snapshot: DeskSnapshot,
    pub prices: VecDeque<f64>,
    pub size: f64,
    pub size_step: f64,
    pub logs: Vec<String>,
}

impl App {
    pub fn new(size: f64, size_step: f64) -> Self {
        Self {
            snapshot: DeskSnapshot::default(),
            prices: VecDeque::with_capacity(CHART_POINTS),
            size,
            size_step,
            logs: Vec::new(),
        }
    }

    pub fn on_event(&mut self, event: UiEvent) {
        match event {
            UiEvent::Sample { sample, risk } => {
                self.snapshot.last_price = Some(sample.price);
                self.snapshot.risk = risk;
                // On-chain marks arrive with desk snapshots, not with feed samples.
                if !self.snapshot.oracle_marks {
                    self.snapshot.mark = Some(MarkPrice::Feed(sample.price));
                    self.snapshot.unrealized_pnl = self
                        .snapshot
                        .ledger
                        .position
                        .as_ref()
                        .map(|p| p.unrealized_pnl(sample.price));
                }
                self.prices.push_back(sample.price);
                if self.prices.len() > CHART_POINTS {
                    self.prices.pop_front();
                }
            }
            UiEvent::Snapshot(snapshot) => {
                self.snapshot = snapshot;
            }
            UiEvent::Log(msg) => {
                self.logs.push(msg);
                if self.logs.len() > MAX_LOGS {
                    self.logs.remove(0);
                }
            }
        }
    }

    fn gate_inputs(&self) -> GateInputs {
        GateInputs {
            wallet_connected: self.snapshot.wallet_address.is_some(),
            write_pending: self.snapshot.write_pending,
            size: self.size,
            has_active_position: self.snapshot.ledger.position.is_some(),
            risk: self.snapshot.risk,
        }
    }

    fn gated(&mut self, decision: GateDecision, command: DeskCommand) -> Option<DeskCommand> {
        match decision {
            GateDecision::Admit => Some(command),
            GateDecision::Deny(reason) => {
                self.on_event(UiEvent::Log(format!("Blocked: {}", reason)));
                None
            }
        }
    }

    /// Maps a key press to a desk command. Size keys only change local state.
    pub fn command_for(&mut self, key: KeyCode) -> Option<DeskCommand> {
        match key {
            KeyCode::Char('v') => Some(DeskCommand::SetFeedActive(!self.snapshot.feed_active)),
            KeyCode::Char('l') | KeyCode::Char('s') => {
                let side = if key == KeyCode::Char('l') {
                    Side::Long
                } else {
                    Side::Short
                };
                let decision = gate::evaluate_open(&self.gate_inputs());
                self.gated(decision, DeskCommand::Open { side, size: self.size })
            }
            KeyCode::Char('c') => {
                let decision = gate::evaluate_close(&self.gate_inputs());
                self.gated(decision, DeskCommand::CloseActive)
            }
            KeyCode::Char('d') => {
                let decision = gate::evaluate_transfer(&self.gate_inputs());
                self.gated(decision, DeskCommand::Lend(self.size))
            }
            KeyCode::Char('b') => {
                let decision = gate::evaluate_transfer(&self.gate_inputs());
                self.gated(decision, DeskCommand::Borrow(self.size))
            }
            KeyCode::Char('+') | KeyCode::Char('=') => {
                self.size += self.size_step;
                None
            }
            KeyCode::Char('-') => {
                self.size = (self.size - self.size_step).max(self.size_step);
                None
            }
            KeyCode::Char('q') | KeyCode::Esc => Some(DeskCommand::Shutdown),
            _ => None,
        }
    }
}

pub async fn run(
    mut rx: mpsc::Receiver<UiEvent>,
    commands: mpsc::Sender<DeskCommand>,
    size: f64,
    size_step: f64,
) -> anyhow::Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(size, size_step);

    loop {
        terminal.draw(|f| ui(f, &app))?;

        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if let Some(command) = app.command_for(key.code) {
                    let quit = matches!(command, DeskCommand::Shutdown);
                    if commands.send(command).await.is_err() || quit {
                        break;
                    }
                }
            }
        }

        while let Ok(event) = rx.try_recv() {
            app.on_event(event);
        }
    }

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    Ok(())
}

fn risk_color(risk: RiskLevel) -> Color {
    match risk {
        RiskLevel::Low => Color::Green,
        RiskLevel::Medium => Color::Yellow,
        RiskLevel::High => Color::Red,
    }
}

fn pnl_span(value: f64) -> Span<'static> {
    let color = if value > 0.0 {
        Color::Green
    } else if value < 0.0 {
        Color::Red
    } else {
        Color::Gray
    };
    Span::styled(format!("{:+.4}", value), Style::default().fg(color))
}

fn key_hint(text: &'static str, enabled: bool) -> Span<'static> {
    if enabled {
        Span::styled(text, Style::default().add_modifier(Modifier::BOLD))
    } else {
        Span::styled(text, Style::default().fg(Color::DarkGray))
    }
}

fn ui(f: &mut ratatui::Frame, app: &App) {
    let snap = &app.snapshot;
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints(
            [
                Constraint::Length(3),
                Constraint::Length(8),
                Constraint::Length(7),
                Constraint::Min(6),
            ]
            .as_ref(),
        )
        .split(f.size());

    let price_text = match snap.last_price {
        Some(p) => format!("{:.4}", p),
        None => "Waiting for data...".to_string(),
    };
    let wallet_text = match (&snap.wallet_address, snap.write_pending) {
        (Some(_), true) => "tx pending".to_string(),
        (Some(addr), false) => short_address(addr),
        (None, _) => "not connected".to_string(),
    };

    let header = Paragraph::new(Line::from(vec![
        Span::styled("Risk Desk", Style::default().add_modifier(Modifier::BOLD)),
        Span::raw(" | Price: "),
        Span::styled(
            price_text,
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" | Risk: "),
        Span::styled(
            snap.risk.to_string(),
            Style::default()
                .fg(risk_color(snap.risk))
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" | Wallet: "),
        Span::raw(wallet_text),
    ]))
    .block(Block::default().borders(Borders::ALL).title("Status"));
    f.render_widget(header, chunks[0]);

    let chart_title = if snap.feed_active {
        format!("Price, {} samples (v: hide)", snap.samples)
    } else {
        "Price feed off (v: show)".to_string()
    };
    let chart_block = Block::default().borders(Borders::ALL).title(chart_title);
    if snap.feed_active {
        f.render_widget(
            Sparkline::default()
                .block(chart_block)
                .data(&scaled_prices(&app.prices))
                .style(Style::default().fg(risk_color(snap.risk))),
            chunks[1],
        );
    } else {
        f.render_widget(chart_block, chunks[1]);
    }

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)].as_ref())
        .split(chunks[2]);

    let inputs = app.gate_inputs();
    let position_lines = match &snap.ledger.position {
        Some(p) => vec![
            Line::from(format!("{} {} @ {:.4}", p.side, p.size, p.entry_price)),
            Line::from(vec![
                Span::raw("Unrealized: "),
                snap.unrealized_pnl.map(pnl_span).unwrap_or_else(|| Span::raw("-")),
                Span::raw(match snap.mark {
                    Some(MarkPrice::Feed(p)) => format!(" @ {:.4} feed", p),
                    Some(MarkPrice::OnChain(p)) => format!(" @ {:.4} on-chain", p),
                    None => String::new(),
                }),
            ]),
            Line::from(key_hint("c: close", gate::can_close(&inputs))),
        ],
        None => vec![
            Line::from("No open position"),
            Line::from(format!("Size: {} (+/-)", app.size)),
            Line::from(vec![
                key_hint("l: long  s: short", gate::can_open(&inputs)),
                Span::raw("  "),
                key_hint("d: lend  b: borrow", gate::can_transfer(&inputs)),
            ]),
        ],
    };
    f.render_widget(
        Paragraph::new(position_lines).block(Block::default().borders(Borders::ALL).title("Position")),
        body[0],
    );

    let pools = vec![
        Line::from(vec![Span::raw("User:     "), pnl_span(snap.ledger.user_pnl)]),
        Line::from(vec![Span::raw("Lenders:  "), pnl_span(snap.ledger.lender_pnl)]),
        Line::from(vec![Span::raw("Protocol: "), pnl_span(snap.ledger.protocol_pnl)]),
        Line::from(format!(
            "Lends: {}  Borrows: {}",
            snap.ledger.lends, snap.ledger.borrows
        )),
    ];
    f.render_widget(
        Paragraph::new(pools).block(Block::default().borders(Borders::ALL).title("Realized PnL")),
        body[1],
    );

    let logs: Vec<ListItem> = app
        .logs
        .iter()
        .rev()
        .map(|s| ListItem::new(Line::from(Span::raw(s.as_str()))))
        .collect();

    let logs_list =
        List::new(logs).block(Block::default().borders(Borders::ALL).title("System Logs"));
    f.render_widget(logs_list, chunks[3]);
}

/// Sparkline wants unsigned bars; rescale the window onto 0..=100.
fn scaled_prices(prices: &VecDeque<f64>) -> Vec<u64> {
    let min = prices.iter().copied().fold(f64::INFINITY, f64::min);
    let max = prices.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = max - min;
    prices
        .iter()
        .map(|p| {
            if span > 0.0 {
                (((p - min) / span) * 100.0).round() as u64 + 1
            } else {
                50
            }
        })
        .collect()
}

fn short_address(addr: &str) -> String {
    let head = addr.get(..6);
    let tail = addr.len().checked_sub(4).and_then(|i| addr.get(i..));
    match (head, tail) {
        (Some(h), Some(t)) if addr.len() > 10 => format!("{}...{}", h, t),
        _ => addr.to_string(),
    }
}
