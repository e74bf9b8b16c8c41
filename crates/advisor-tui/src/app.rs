use std::time::Instant;

use advisor_core::state::SettingsStatus;
use advisor_core::{CaptureTarget, DisplayInfo, Input, Session, WorkerEvent};
use ratatui::layout::Rect;
use ratatui::widgets::ListState;
use tracing::{info, warn};

/// Topics offered in the sidebar, sent with keys `1` to `4`
pub const SUGGESTED_TOPICS: [&str; 4] = [
    "What is phishing?",
    "How to create secure passwords",
    "Explain two-factor authentication",
    "What is ransomware?",
];

/// Typing `/image <path>` in the input box sends a PNG file for analysis
pub const IMAGE_COMMAND: &str = "/image ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

/// One row of the display picker
#[derive(Debug, Clone)]
pub struct ScanChoice {
    pub label: String,
    pub target: CaptureTarget,
}

pub struct App {
    pub session: Session,
    pub should_quit: bool,
    pub input_mode: InputMode,

    // Chat input
    pub input: String,
    pub input_cursor: usize, // cursor position in chars

    // Chat pane
    pub chat_scroll: u16,
    pub chat_height: u16, // inner height, set while rendering
    pub chat_width: u16,  // inner width, set while rendering
    pub chat_area: Option<Rect>,

    // Animation state
    pub animation_frame: u8, // 0-2 for the "Typing..." dots

    // API key dialog
    pub show_api_key_input: bool,
    pub api_key_input: String,
    pub api_key_input_cursor: usize,

    // Display picker
    pub show_display_picker: bool,
    pub scan_choices: Vec<ScanChoice>,
    pub display_picker_state: ListState,
}

impl App {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            should_quit: false,
            input_mode: InputMode::Normal,
            input: String::new(),
            input_cursor: 0,
            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            chat_area: None,
            animation_frame: 0,
            show_api_key_input: false,
            api_key_input: String::new(),
            api_key_input_cursor: 0,
            show_display_picker: false,
            scan_choices: Vec::new(),
            display_picker_state: ListState::default(),
        }
    }

    /// Called on every tick event
    pub fn tick(&mut self) {
        if self.session.ui().is_busy {
            self.animation_frame = (self.animation_frame + 1) % 3;
        } else {
            self.animation_frame = 0;
        }
        self.session.tick(Instant::now());
    }

    /// Apply a worker result and react to what it changed
    pub fn apply_worker_event(&mut self, event: WorkerEvent) {
        self.session.apply(event);

        if self.show_api_key_input
            && self.session.ui().settings_status == Some(SettingsStatus::Verified)
        {
            self.close_api_key_dialog();
        }
        self.sync_settings_request();
        self.scroll_chat_to_bottom();
    }

    /// Send a prompt, or an image file for `/image <path>`
    pub fn submit(&mut self, text: &str) {
        let text = text.trim();
        let input = match text.strip_prefix(IMAGE_COMMAND) {
            Some(path) => match std::fs::read(path.trim()) {
                Ok(bytes) => Input::Image(bytes),
                Err(e) => {
                    warn!("could not read image {}: {}", path.trim(), e);
                    self.session
                        .notice(format!("Could not read image {}: {}", path.trim(), e));
                    self.scroll_chat_to_bottom();
                    return;
                }
            },
            None => Input::Prompt(text.to_string()),
        };

        if let Some(id) = self.session.dispatch(input) {
            info!(id, "request dispatched");
        }
        self.sync_settings_request();
        self.scroll_chat_to_bottom();
    }

    pub fn send_suggested_topic(&mut self, index: usize) {
        if let Some(topic) = SUGGESTED_TOPICS.get(index) {
            self.submit(topic);
        }
    }

    /// Scan straight away on a single display, otherwise let the user pick
    pub fn start_scan(&mut self) {
        if self.session.ui().is_busy {
            return;
        }

        let displays = match self.session.displays() {
            Ok(displays) => displays,
            Err(e) => {
                warn!("could not list displays: {}", e);
                Vec::new()
            }
        };

        if displays.len() <= 1 {
            self.scan(CaptureTarget::FullScreen);
            return;
        }

        self.scan_choices = scan_choices(&displays);
        self.display_picker_state.select(Some(0));
        self.show_display_picker = true;
    }

    pub fn confirm_display_choice(&mut self) {
        let target = self
            .display_picker_state
            .selected()
            .and_then(|i| self.scan_choices.get(i))
            .map(|choice| choice.target)
            .unwrap_or_default();
        self.close_display_picker();
        self.scan(target);
    }

    pub fn close_display_picker(&mut self) {
        self.show_display_picker = false;
        self.scan_choices.clear();
    }

    pub fn display_picker_down(&mut self) {
        if let Some(i) = self.display_picker_state.selected() {
            if i + 1 < self.scan_choices.len() {
                self.display_picker_state.select(Some(i + 1));
            }
        }
    }

    pub fn display_picker_up(&mut self) {
        if let Some(i) = self.display_picker_state.selected() {
            self.display_picker_state.select(Some(i.saturating_sub(1)));
        }
    }

    fn scan(&mut self, target: CaptureTarget) {
        self.session.scan_screen(target);
        self.sync_settings_request();
        self.scroll_chat_to_bottom();
    }

    pub fn open_api_key_dialog(&mut self) {
        self.input_mode = InputMode::Normal;
        self.show_api_key_input = true;
        self.api_key_input.clear();
        self.api_key_input_cursor = 0;
        self.session.dismiss_settings_status();
    }

    pub fn close_api_key_dialog(&mut self) {
        self.show_api_key_input = false;
        self.api_key_input.clear();
        self.api_key_input_cursor = 0;
        self.session.dismiss_settings_status();
    }

    /// Save the typed key; the dialog stays open until the test succeeds
    pub fn save_api_key(&mut self) {
        let key = std::mem::take(&mut self.api_key_input);
        self.api_key_input_cursor = 0;
        if let Err(e) = self.session.save_credential(&key) {
            warn!("API key not saved: {}", e);
        }
    }

    pub fn clear_chat(&mut self) {
        self.session.clear_conversation();
        self.chat_scroll = 0;
    }

    /// Open the API key dialog when the session asked for it
    fn sync_settings_request(&mut self) {
        if self.session.take_settings_request() && !self.show_api_key_input {
            self.open_api_key_dialog();
        }
    }

    pub fn scroll_chat_up(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_sub(lines);
    }

    pub fn scroll_chat_down(&mut self, lines: u16) {
        let max = self.chat_line_count().saturating_sub(self.visible_chat_height());
        self.chat_scroll = self.chat_scroll.saturating_add(lines).min(max);
    }

    /// Scroll so the newest message (or "Typing...") is visible
    pub fn scroll_chat_to_bottom(&mut self) {
        let total = self.chat_line_count();
        let visible = self.visible_chat_height();
        self.chat_scroll = total.saturating_sub(visible);
    }

    fn visible_chat_height(&self) -> u16 {
        if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        }
    }

    /// Lines the chat pane needs after wrapping
    fn chat_line_count(&self) -> u16 {
        let width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        let mut total: usize = 0;
        for message in self.session.messages() {
            total += 1; // sender line
            total += message
                .content
                .lines()
                .map(|line| wrapped_line_count(line, width))
                .sum::<usize>();
            total += 1; // blank line after message
        }

        if self.session.ui().is_busy {
            total += 2; // sender line + "Typing..."
        }

        total.min(u16::MAX as usize) as u16
    }
}

/// Rows a line of text takes when wrapped at `width` columns
pub fn wrapped_line_count(line: &str, width: usize) -> usize {
    let chars = line.chars().count();
    if chars == 0 || width == 0 {
        1
    } else {
        chars.div_ceil(width)
    }
}

/// Picker rows: the whole desktop first, then each display
pub fn scan_choices(displays: &[DisplayInfo]) -> Vec<ScanChoice> {
    let mut choices = vec![ScanChoice {
        label: "Full screen".to_string(),
        target: CaptureTarget::FullScreen,
    }];

    choices.extend(displays.iter().map(|display| ScanChoice {
        label: format!(
            "{} ({}x{}){}",
            display.name,
            display.width,
            display.height,
            if display.is_primary { " primary" } else { "" }
        ),
        target: CaptureTarget::Display(display.index),
    }));

    choices
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrapped_line_count() {
        assert_eq!(wrapped_line_count("", 10), 1);
        assert_eq!(wrapped_line_count("short", 10), 1);
        assert_eq!(wrapped_line_count("exactly10!", 10), 1);
        assert_eq!(wrapped_line_count("eleven chars", 10), 2);
        assert_eq!(wrapped_line_count("ééééé", 2), 3);
    }

    #[test]
    fn test_scan_choices_start_with_full_screen() {
        let displays = vec![
            DisplayInfo {
                index: 0,
                name: "Display 1".to_string(),
                width: 1920,
                height: 1080,
                is_primary: true,
            },
            DisplayInfo {
                index: 1,
                name: "Display 2".to_string(),
                width: 1280,
                height: 1024,
                is_primary: false,
            },
        ];

        let choices = scan_choices(&displays);
        assert_eq!(choices.len(), 3);
        assert_eq!(choices[0].target, CaptureTarget::FullScreen);
        assert_eq!(choices[1].label, "Display 1 (1920x1080) primary");
        assert_eq!(choices[2].target, CaptureTarget::Display(1));
    }
}
