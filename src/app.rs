use anyhow::{anyhow, Result};

use crate::fragment::{Fragment, FragmentAtlas, Kind};
use crate::gemini;
use crate::oracle::OracleSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

/// Page cursor for a manifestation: clamps at both ends, never wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pager {
    page: usize,
    len: usize,
}

impl Pager {
    pub fn new(len: usize) -> Self {
        Self { page: 0, len }
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn next(&mut self) {
        if self.len > 0 {
            self.page = (self.page + 1).min(self.len - 1);
        }
    }

    pub fn prev(&mut self) {
        self.page = self.page.saturating_sub(1);
    }

    pub fn first(&mut self) {
        self.page = 0;
    }

    pub fn last(&mut self) {
        self.page = self.len.saturating_sub(1);
    }

    pub fn counter(&self) -> String {
        format!("{} / {}", self.page + 1, self.len.max(1))
    }
}

/// Rendering strategy per fragment. Each variant is one of the uniquely
/// themed full-screen treatments; the mapping is by fragment id, with the
/// category tag as fallback so the table stays total over any data set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Archive,
    Tome,
    Muse,
    Verse,
    Reel,
    Nocturne,
    Manifesto,
    Gallery,
    Oracle,
}

impl Layout {
    pub fn for_fragment(fragment: &Fragment) -> Self {
        match fragment.id.as_str() {
            "prodigio" => Layout::Archive,
            "piacere" => Layout::Tome,
            "duse" => Layout::Muse,
            "alcyone" | "sera" | "pioggia" => Layout::Verse,
            "esilio" => Layout::Reel,
            "notturno" => Layout::Nocturne,
            "impresa" => Layout::Manifesto,
            "vittoriale" => Layout::Gallery,
            _ => match fragment.kind {
                Kind::Event => Layout::Archive,
                Kind::Work => Layout::Tome,
                Kind::Poem => Layout::Verse,
                Kind::Muse => Layout::Muse,
                Kind::Location => Layout::Gallery,
                Kind::Oracle => Layout::Oracle,
            },
        }
    }

    pub fn heading(&self) -> &'static str {
        match self {
            Layout::Archive => "Cronache di una Vita Inimitabile",
            Layout::Tome => "Il Romanzo",
            Layout::Muse => "La Divina",
            Layout::Verse => "Il Canto",
            Layout::Reel => "La Pellicola",
            Layout::Nocturne => "Il Commentario della Tenebra",
            Layout::Manifesto => "Il Proclama",
            Layout::Gallery => "Le Visioni",
            Layout::Oracle => "Chiedi all'Ombra",
        }
    }
}

/// The open full-screen overlay. Everything here dies when it closes,
/// including the oracle transcript.
pub struct Manifestation {
    pub index: usize,
    pub layout: Layout,
    pub pager: Pager,
    pub revealed: bool,

    // Oracle overlay only
    pub oracle: Option<OracleSession>,
    pub input: String,
    pub cursor: usize,
    pub chat_scroll: u16,
    pub chat_height: u16,
    pub chat_width: u16,
}

impl Manifestation {
    fn open(index: usize, fragment: &Fragment) -> Self {
        let layout = Layout::for_fragment(fragment);
        let page_count = match layout {
            Layout::Gallery if !fragment.gallery.is_empty() => fragment.gallery.len(),
            _ => fragment.pages.len().max(1),
        };
        Self {
            index,
            layout,
            pager: Pager::new(page_count),
            revealed: false,
            oracle: matches!(layout, Layout::Oracle).then(OracleSession::new),
            input: String::new(),
            cursor: 0,
            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
        }
    }

    /// Scroll the chat so the newest entry (or the thinking line) is
    /// visible. Wrapping is estimated from the rendered chat width.
    pub fn autoscroll(&mut self) {
        let Some(session) = self.oracle.as_ref() else {
            return;
        };
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        let mut total_lines: u16 = 0;
        for turn in session.turns() {
            total_lines += 1; // speaker line
            for line in turn.text.lines() {
                // Character count, not byte length, for UTF-8 text
                let char_count = line.chars().count();
                if char_count == 0 {
                    total_lines += 1;
                } else {
                    total_lines += ((char_count / wrap_width) + 1) as u16;
                }
            }
            total_lines += 1; // blank line after each turn
        }

        if session.is_pending() {
            total_lines += 2; // speaker line + thinking ellipsis
        }

        let visible = if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        };
        self.chat_scroll = total_lines.saturating_sub(visible);
    }
}

pub struct App {
    pub should_quit: bool,
    pub input_mode: InputMode,

    pub atlas: FragmentAtlas,
    /// Selected node on the field, an index along the chronological path.
    pub selected: usize,
    pub open: Option<Manifestation>,

    /// In-flight oracle request, at most one at a time.
    pub oracle_task: Option<tokio::task::JoinHandle<Result<String>>>,

    /// 0-2, drives the thinking ellipsis and the oracle node pulse.
    pub animation_frame: u8,
}

impl App {
    pub fn new() -> Result<Self> {
        let atlas = FragmentAtlas::load()?;
        Ok(Self {
            should_quit: false,
            input_mode: InputMode::Normal,
            atlas,
            selected: 0,
            open: None,
            oracle_task: None,
            animation_frame: 0,
        })
    }

    pub fn selected_fragment(&self) -> Option<&Fragment> {
        self.atlas.get_by_index(self.selected)
    }

    pub fn open_fragment(&self) -> Option<&Fragment> {
        self.open
            .as_ref()
            .and_then(|m| self.atlas.get_by_index(m.index))
    }

    // Field navigation along the path
    pub fn field_next(&mut self) {
        let len = self.atlas.len();
        if len > 0 {
            self.selected = (self.selected + 1).min(len - 1);
        }
    }

    pub fn field_prev(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    pub fn field_first(&mut self) {
        self.selected = 0;
    }

    pub fn field_last(&mut self) {
        self.selected = self.atlas.len().saturating_sub(1);
    }

    pub fn open_selected(&mut self) {
        if let Some(fragment) = self.atlas.get_by_index(self.selected) {
            self.open = Some(Manifestation::open(self.selected, fragment));
            self.input_mode = InputMode::Normal;
        }
    }

    pub fn close_overlay(&mut self) {
        if let Some(overlay) = self.open.take() {
            if overlay.oracle.is_some() {
                // The transcript dies with the overlay; an in-flight
                // request has nowhere to land.
                if let Some(task) = self.oracle_task.take() {
                    task.abort();
                }
            }
        }
        self.input_mode = InputMode::Normal;
    }

    /// Submit the oracle input buffer. Blank input and an in-flight request
    /// are both silent no-ops; the user turn is inserted before the call
    /// resolves.
    pub fn submit_question(&mut self) {
        let Some(overlay) = self.open.as_mut() else {
            return;
        };
        let Some(session) = overlay.oracle.as_mut() else {
            return;
        };

        let question = overlay.input.clone();
        let Some(question) = session.begin(&question) else {
            return;
        };
        overlay.input.clear();
        overlay.cursor = 0;
        self.input_mode = InputMode::Normal;

        match gemini::shared() {
            Ok(client) => {
                let client = client.clone();
                self.oracle_task =
                    Some(tokio::spawn(async move { client.query(&question).await }));
            }
            Err(err) => {
                // Missing credential: same fallback turn as any failure
                session.resolve(Err(err));
            }
        }

        if let Some(overlay) = self.open.as_mut() {
            overlay.autoscroll();
        }
    }

    /// Fold a finished oracle request into the session. Called from the run
    /// loop after every event, including ticks.
    pub async fn poll_oracle(&mut self) {
        if !self
            .oracle_task
            .as_ref()
            .is_some_and(|task| task.is_finished())
        {
            return;
        }
        let Some(task) = self.oracle_task.take() else {
            return;
        };
        let outcome = match task.await {
            Ok(outcome) => outcome,
            Err(err) => Err(anyhow!("oracle task failed: {err}")),
        };

        if let Some(overlay) = self.open.as_mut() {
            if let Some(session) = overlay.oracle.as_mut() {
                session.resolve(outcome);
                overlay.autoscroll();
            }
        }
    }

    pub fn tick_animation(&mut self) {
        self.animation_frame = (self.animation_frame + 1) % 3;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pager_clamps_at_both_ends() {
        let mut pager = Pager::new(3);
        pager.prev();
        assert_eq!(pager.page(), 0);
        pager.next();
        pager.next();
        assert_eq!(pager.page(), 2);
        pager.next();
        assert_eq!(pager.page(), 2);
        assert_eq!(pager.counter(), "3 / 3");
        pager.first();
        assert_eq!(pager.page(), 0);
        pager.last();
        assert_eq!(pager.page(), 2);
    }

    #[test]
    fn test_empty_pager_does_not_underflow() {
        let mut pager = Pager::new(0);
        pager.next();
        pager.prev();
        pager.last();
        assert_eq!(pager.page(), 0);
        assert_eq!(pager.counter(), "1 / 1");
    }

    #[test]
    fn test_layout_dispatch_covers_the_whole_atlas() {
        let atlas = FragmentAtlas::load().unwrap();
        for fragment in atlas.all() {
            // Total function: every fragment maps to some layout
            let layout = Layout::for_fragment(fragment);
            if fragment.kind == Kind::Oracle {
                assert_eq!(layout, Layout::Oracle);
            }
        }
        assert_eq!(
            Layout::for_fragment(atlas.get("notturno").unwrap()),
            Layout::Nocturne
        );
        assert_eq!(
            Layout::for_fragment(atlas.get("vittoriale").unwrap()),
            Layout::Gallery
        );
    }

    #[test]
    fn test_unknown_id_falls_back_to_kind() {
        let atlas = FragmentAtlas::from_json(
            r#"[{
                "id": "nuovo", "label": "Nuovo", "kind": "poem", "era": "1910",
                "x": 0, "y": 0, "scale": 1.0, "rotation": 0,
                "content": ["strofa"]
            }]"#,
        )
        .unwrap();
        assert_eq!(
            Layout::for_fragment(atlas.get("nuovo").unwrap()),
            Layout::Verse
        );
    }

    #[test]
    fn test_field_selection_clamps() {
        let mut app = App::new().unwrap();
        app.field_prev();
        assert_eq!(app.selected, 0);
        for _ in 0..100 {
            app.field_next();
        }
        assert_eq!(app.selected, app.atlas.len() - 1);
        app.field_first();
        assert_eq!(app.selected, 0);
    }

    #[test]
    fn test_gallery_pager_counts_gallery_entries() {
        let app = App::new().unwrap();
        let fragment = app.atlas.get("vittoriale").unwrap();
        let overlay = Manifestation::open(0, fragment);
        assert_eq!(overlay.layout, Layout::Gallery);
        assert_eq!(overlay.pager.len(), fragment.gallery.len());
    }

    #[test]
    fn test_oracle_transcript_dies_with_the_overlay() {
        let mut app = App::new().unwrap();
        app.field_last(); // the oracle node closes the path
        app.open_selected();

        {
            let overlay = app.open.as_mut().unwrap();
            assert_eq!(overlay.layout, Layout::Oracle);
            let session = overlay.oracle.as_mut().unwrap();
            session.begin("chi sei?");
            session.resolve(Ok("un'ombra".to_string()));
            assert_eq!(session.turns().len(), 2);
        }

        app.close_overlay();
        app.open_selected();

        let session = app.open.as_ref().unwrap().oracle.as_ref().unwrap();
        assert!(session.turns().is_empty());
        assert!(!session.is_pending());
    }
}
