use advisor_core::state::{NotificationLevel, SettingsStatus};
use advisor_core::{Sender, Status, Verbosity};
use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
    Frame,
};

use crate::app::{App, InputMode, SUGGESTED_TOPICS};

const SIDEBAR_WIDTH: u16 = 38;

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Nothing of the conversation may end up in the screenshot
    if app.session.ui().capturing {
        frame.render_widget(Clear, area);
        return;
    }

    let [header_area, body_area, input_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .areas(area);

    let [chat_area, sidebar_area] =
        Layout::horizontal([Constraint::Min(0), Constraint::Length(SIDEBAR_WIDTH)]).areas(body_area);

    render_header(app, frame, header_area);
    render_chat(app, frame, chat_area);
    render_sidebar(app, frame, sidebar_area);
    render_input(app, frame, input_area);
    render_footer(app, frame, footer_area);

    // Popups last so they sit on top
    if app.show_api_key_input {
        render_api_key_input(app, frame, area);
    } else if app.show_display_picker {
        render_display_picker(app, frame, area);
    }
    render_notification(app, frame, area);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let ui = app.session.ui();
    let voice = if ui.voice_enabled { "voice on" } else { "voice off" };
    let mode = match ui.verbosity {
        Verbosity::Short => "short answers",
        Verbosity::Full => "full answers",
    };

    let title = Line::from(vec![
        Span::styled(" Cybersecurity Advisor ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::Gray),
        ),
        Span::raw("  "),
        Span::styled(format!("[{}] [{}]", voice, mode), Style::default().fg(Color::Gray)),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    // Inner size for scroll calculations
    app.chat_area = Some(area);
    app.chat_height = area.height.saturating_sub(2);
    app.chat_width = area.width.saturating_sub(2);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Conversation ");

    let is_busy = app.session.ui().is_busy;
    let mut lines: Vec<Line> = Vec::new();

    for message in app.session.messages() {
        let (name_color, text_style) = match message.sender {
            Sender::User => (Color::Cyan, Style::default().fg(Color::Cyan)),
            Sender::Assistant => (Color::Yellow, Style::default()),
        };

        lines.push(Line::from(vec![
            Span::styled(
                format!("{}:", message.sender.display_name()),
                Style::default().fg(name_color).add_modifier(Modifier::BOLD),
            ),
            Span::styled(format!(" {}", message.timestamp), Style::default().fg(Color::DarkGray)),
        ]));
        for line in message.content.lines() {
            lines.push(Line::styled(line.to_string(), text_style));
        }
        lines.push(Line::default());
    }

    if is_busy {
        lines.push(Line::from(Span::styled(
            format!("{}:", Sender::Assistant.display_name()),
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )));
        // Animated ellipsis: ".", "..", "..."
        let dots = ".".repeat(app.animation_frame as usize + 1);
        lines.push(Line::from(Span::styled(
            format!("Typing{}", dots),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    }

    let text = if lines.is_empty() {
        Text::from(Span::styled(
            "Ask a question about staying safe online...",
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        Text::from(lines)
    };

    let chat = Paragraph::new(text)
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((app.chat_scroll, 0));
    frame.render_widget(chat, area);
}

fn render_sidebar(app: &App, frame: &mut Frame, area: Rect) {
    let ui = app.session.ui();
    let key = Style::default().fg(Color::Yellow).bold();
    let dim = Style::default().fg(Color::DarkGray);

    let mut lines = vec![
        Line::from(Span::styled("Quick actions", Style::default().bold())),
        Line::from(vec![Span::styled(" s ", key), Span::raw("Scan screen for threats")]),
        Line::from(vec![Span::styled(" c ", key), Span::raw("Clear chat")]),
        Line::from(vec![Span::styled(" K ", key), Span::raw("API key settings")]),
        Line::from(vec![
            Span::styled(" v ", key),
            Span::raw(format!("Voice: {}", if ui.voice_enabled { "on" } else { "off" })),
        ]),
        Line::from(vec![
            Span::styled(" m ", key),
            Span::raw(format!("Answers: {}", ui.verbosity.as_str())),
        ]),
        Line::from(vec![Span::styled(" x ", key), Span::raw("Stop audio")]),
        Line::default(),
        Line::from(Span::styled("Suggested topics", Style::default().bold())),
    ];

    for (i, topic) in SUGGESTED_TOPICS.iter().enumerate() {
        lines.push(Line::from(vec![
            Span::styled(format!(" {} ", i + 1), key),
            Span::raw(*topic),
        ]));
    }

    lines.push(Line::default());
    let credential = if app.session.has_credential() {
        format!("API key: {}", app.session.credential_source().as_str())
    } else {
        "API key: not set (press K)".to_string()
    };
    lines.push(Line::from(Span::styled(credential, dim)));

    let sidebar = Paragraph::new(lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::DarkGray))
                .title(" Advisor "),
        )
        .wrap(Wrap { trim: true });
    frame.render_widget(sidebar, area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let editing = app.input_mode == InputMode::Editing;
    let border_color = if editing { Color::Yellow } else { Color::DarkGray };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(" Ask about cybersecurity (i to type, Enter to send) ");

    // Horizontal scrolling keeps the cursor visible
    let inner_width = area.width.saturating_sub(2) as usize;
    let scroll_offset = if inner_width == 0 || app.input_cursor < inner_width {
        0
    } else {
        app.input_cursor - inner_width + 1
    };

    let visible: String = app
        .input
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let input = Paragraph::new(visible)
        .style(Style::default().fg(Color::Cyan))
        .block(block);
    frame.render_widget(input, area);

    if editing {
        let cursor_x = (app.input_cursor - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let status = app.session.ui().status;
    let status_style = match status {
        Status::Ready => Style::default().bg(Color::Green).fg(Color::Black),
        Status::Error => Style::default().bg(Color::Red).fg(Color::White),
        _ => Style::default().bg(Color::Yellow).fg(Color::Black),
    };

    let hints = match app.input_mode {
        InputMode::Normal => " 1-4 topics | s scan | j/k scroll | q quit",
        InputMode::Editing => " Enter send | Esc stop typing | /image <path> to analyse a PNG",
    };

    let footer = Line::from(vec![
        Span::styled(format!(" {} ", status.label()), status_style),
        Span::styled(hints, Style::default().fg(Color::DarkGray)),
    ]);
    frame.render_widget(Paragraph::new(footer), area);
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width.saturating_sub(4));
    let height = height.min(area.height);
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width, height)
}

/// Asterisks for all but the last four characters
pub fn mask_key(key: &str) -> String {
    let count = key.chars().count();
    if count <= 4 {
        return "*".repeat(count);
    }

    let hidden = count - 4;
    let last_four: String = key.chars().skip(hidden).collect();
    format!("{}{}", "*".repeat(hidden.min(24)), last_four)
}

fn render_api_key_input(app: &App, frame: &mut Frame, area: Rect) {
    let popup_area = centered(area, 64, 9);
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Gemini API Key ");
    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);

    let instructions = Paragraph::new("Paste your API key. Enter to save and test, Esc to close.")
        .style(Style::default().fg(Color::DarkGray))
        .wrap(Wrap { trim: true });
    frame.render_widget(instructions, Rect::new(inner.x, inner.y, inner.width, 2));

    let input_area = Rect::new(inner.x, inner.y + 3, inner.width, 1);
    let masked = mask_key(&app.api_key_input);
    frame.render_widget(
        Paragraph::new(masked.clone()).style(Style::default().fg(Color::Cyan)),
        input_area,
    );
    let cursor_x = masked.chars().count().min(input_area.width as usize) as u16;
    frame.set_cursor_position((input_area.x + cursor_x, input_area.y));

    let (status, style) = match &app.session.ui().settings_status {
        Some(SettingsStatus::Testing) => (
            SettingsStatus::Testing.message().to_string(),
            Style::default().fg(Color::Yellow),
        ),
        Some(SettingsStatus::Verified) => (
            SettingsStatus::Verified.message().to_string(),
            Style::default().fg(Color::Green),
        ),
        Some(failed @ SettingsStatus::Failed(_)) => {
            (failed.message().to_string(), Style::default().fg(Color::Red))
        }
        None => (
            format!("Stored in {}", app.session.credential_path().display()),
            Style::default().fg(Color::DarkGray),
        ),
    };
    frame.render_widget(
        Paragraph::new(status).style(style).wrap(Wrap { trim: true }),
        Rect::new(inner.x, inner.y + 5, inner.width, inner.height.saturating_sub(5)),
    );
}

fn render_display_picker(app: &mut App, frame: &mut Frame, area: Rect) {
    let height = (app.scan_choices.len() as u16 + 2).min(12);
    let popup_area = centered(area, 50, height);
    frame.render_widget(Clear, popup_area);

    let items: Vec<ListItem> = app
        .scan_choices
        .iter()
        .map(|choice| ListItem::new(format!(" {} ", choice.label)))
        .collect();

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan))
                .title(" Scan which screen? (Enter to scan, Esc to cancel) "),
        )
        .highlight_style(
            Style::default()
                .bg(Color::Cyan)
                .fg(Color::Black)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, popup_area, &mut app.display_picker_state);
}

fn render_notification(app: &App, frame: &mut Frame, area: Rect) {
    let Some(notification) = &app.session.ui().notification else {
        return;
    };

    let color = match notification.level {
        NotificationLevel::Alert => Color::Red,
        NotificationLevel::Clear => Color::Green,
    };

    let width = 44.min(area.width);
    let popup_area = Rect::new(area.x + area.width - width, area.y + 1, width, 4.min(area.height));
    frame.render_widget(Clear, popup_area);

    let popup = Paragraph::new(notification.message.as_str())
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(color))
                .title(format!(" {} ", notification.title)),
        )
        .wrap(Wrap { trim: true });
    frame.render_widget(popup, popup_area);
}
