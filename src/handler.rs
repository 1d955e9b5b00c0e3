use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::app::{App, InputMode, Layout};
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string edits.
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub async fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => app.tick_animation(),
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Ctrl-C quits from anywhere
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key),
        InputMode::Editing => handle_editing_mode(app, key),
    }
}

fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    if app.open.is_some() {
        handle_manifestation_normal(app, key);
    } else {
        handle_field(app, key);
    }
}

fn handle_field(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,

        // Walk the golden thread
        KeyCode::Char('j') | KeyCode::Char('l') | KeyCode::Down | KeyCode::Right => {
            app.field_next()
        }
        KeyCode::Char('k') | KeyCode::Char('h') | KeyCode::Up | KeyCode::Left => {
            app.field_prev()
        }
        KeyCode::Char('g') => app.field_first(),
        KeyCode::Char('G') => app.field_last(),

        KeyCode::Enter => {
            app.open_selected();
            // The oracle opens straight onto its question line
            if app
                .open
                .as_ref()
                .is_some_and(|m| m.layout == Layout::Oracle)
            {
                app.input_mode = InputMode::Editing;
            }
        }
        _ => {}
    }
}

fn handle_manifestation_normal(app: &mut App, key: KeyEvent) {
    let is_oracle = app
        .open
        .as_ref()
        .is_some_and(|m| m.layout == Layout::Oracle);

    match key.code {
        KeyCode::Esc | KeyCode::Char('q') => app.close_overlay(),

        // Oracle: focus the question line
        KeyCode::Char('i') | KeyCode::Char('/') if is_oracle => {
            app.input_mode = InputMode::Editing;
        }

        // Oracle: scroll the transcript
        KeyCode::Char('j') | KeyCode::Down if is_oracle => {
            if let Some(overlay) = app.open.as_mut() {
                overlay.chat_scroll = overlay.chat_scroll.saturating_add(1);
            }
        }
        KeyCode::Char('k') | KeyCode::Up if is_oracle => {
            if let Some(overlay) = app.open.as_mut() {
                overlay.chat_scroll = overlay.chat_scroll.saturating_sub(1);
            }
        }

        // Pagination, clamped at both ends
        KeyCode::Char('l') | KeyCode::Right | KeyCode::Char(' ') | KeyCode::Char('j')
        | KeyCode::Down => {
            if let Some(overlay) = app.open.as_mut() {
                overlay.pager.next();
            }
        }
        KeyCode::Char('h') | KeyCode::Left | KeyCode::Char('k') | KeyCode::Up => {
            if let Some(overlay) = app.open.as_mut() {
                overlay.pager.prev();
            }
        }
        KeyCode::Char('g') => {
            if let Some(overlay) = app.open.as_mut() {
                overlay.pager.first();
            }
        }
        KeyCode::Char('G') => {
            if let Some(overlay) = app.open.as_mut() {
                overlay.pager.last();
            }
        }

        // Reveal the exegesis panel, if the fragment carries one
        KeyCode::Char('a') => {
            let has_analysis = app.open_fragment().is_some_and(|f| f.analysis.is_some());
            if let Some(overlay) = app.open.as_mut() {
                if has_analysis {
                    overlay.revealed = !overlay.revealed;
                }
            }
        }
        _ => {}
    }
}

fn handle_editing_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.input_mode = InputMode::Normal,
        KeyCode::Enter => app.submit_question(),
        KeyCode::Backspace => {
            if let Some(overlay) = app.open.as_mut() {
                if overlay.cursor > 0 {
                    overlay.cursor -= 1;
                    let byte_pos = char_to_byte_index(&overlay.input, overlay.cursor);
                    overlay.input.remove(byte_pos);
                }
            }
        }
        KeyCode::Delete => {
            if let Some(overlay) = app.open.as_mut() {
                let char_count = overlay.input.chars().count();
                if overlay.cursor < char_count {
                    let byte_pos = char_to_byte_index(&overlay.input, overlay.cursor);
                    overlay.input.remove(byte_pos);
                }
            }
        }
        KeyCode::Left => {
            if let Some(overlay) = app.open.as_mut() {
                overlay.cursor = overlay.cursor.saturating_sub(1);
            }
        }
        KeyCode::Right => {
            if let Some(overlay) = app.open.as_mut() {
                let char_count = overlay.input.chars().count();
                overlay.cursor = (overlay.cursor + 1).min(char_count);
            }
        }
        KeyCode::Home => {
            if let Some(overlay) = app.open.as_mut() {
                overlay.cursor = 0;
            }
        }
        KeyCode::End => {
            if let Some(overlay) = app.open.as_mut() {
                overlay.cursor = overlay.input.chars().count();
            }
        }
        KeyCode::Char(c) => {
            if let Some(overlay) = app.open.as_mut() {
                let byte_pos = char_to_byte_index(&overlay.input, overlay.cursor);
                overlay.input.insert(byte_pos, c);
                overlay.cursor += 1;
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_char_to_byte_index_handles_accents() {
        let s = "perché no";
        assert_eq!(char_to_byte_index(s, 0), 0);
        // 'é' is two bytes; the char after it starts at byte 7
        assert_eq!(char_to_byte_index(s, 6), 7);
        assert_eq!(char_to_byte_index(s, 100), s.len());
    }
}
