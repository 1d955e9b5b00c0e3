use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Layout as UiLayout, Rect},
    style::{Color, Modifier, Style, Stylize},
    symbols,
    text::{Line, Span, Text},
    widgets::{
        canvas::{Canvas, Line as CanvasLine},
        Block, Borders, Padding, Paragraph, Wrap,
    },
};

use crate::app::{App, InputMode, Layout, Manifestation};
use crate::fragment::{Fragment, TimelineEntry};
use crate::oracle::Role;

// The palette of the source material: gold dust on the void, dried blood,
// parchment.
const GOLD: Color = Color::Rgb(197, 160, 89);
const PARCHMENT: Color = Color::Rgb(230, 220, 200);
const BLOOD: Color = Color::Rgb(138, 46, 46);
const THREAD: Color = Color::Rgb(80, 66, 38);

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    let [header_area, body_area, footer_area] = UiLayout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);

    if app.open.is_some() {
        render_manifestation(app, frame, body_area);
    } else {
        render_field(app, frame, body_area);
    }

    render_footer(app, frame, footer_area);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let era = app
        .open_fragment()
        .or_else(|| app.selected_fragment())
        .map(|f| f.era.clone())
        .unwrap_or_default();

    let title = Line::from(vec![
        Span::styled(" GABRIELE D'ANNUNZIO ", Style::default().fg(GOLD).bold()),
        Span::styled(era, Style::default().fg(Color::DarkGray)),
        Span::raw(" "),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::Black));
    frame.render_widget(header, area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let is_oracle = app
        .open
        .as_ref()
        .is_some_and(|m| m.layout == Layout::Oracle);

    let hints = match (app.input_mode, app.open.is_some(), is_oracle) {
        (InputMode::Editing, _, _) => " Enter invia · Esc annulla ",
        (_, true, true) => " i domanda · j/k scorri · Esc chiudi ",
        (_, true, false) => " h/l pagina · a esegesi · Esc chiudi ",
        (_, false, _) => " h/l cammina il filo d'oro · Enter apri · q esci ",
    };

    let footer = Paragraph::new(Line::from(Span::styled(
        hints,
        Style::default().fg(Color::DarkGray),
    )));
    frame.render_widget(footer, area);
}

/// The exploratory field: every fragment at its percent coordinates, joined
/// in path order by the golden thread, selection walking chronologically.
fn render_field(app: &App, frame: &mut Frame, area: Rect) {
    let fragments = app.atlas.all();
    let selected = app.selected;
    let pulse = app.animation_frame;

    let canvas = Canvas::default()
        .block(Block::default().borders(Borders::NONE))
        .marker(symbols::Marker::Braille)
        .x_bounds([0.0, 100.0])
        .y_bounds([0.0, 100.0])
        .paint(move |ctx| {
            // The golden thread, dim behind the nodes
            for pair in fragments.windows(2) {
                ctx.draw(&CanvasLine {
                    x1: pair[0].x,
                    y1: 100.0 - pair[0].y,
                    x2: pair[1].x,
                    y2: 100.0 - pair[1].y,
                    color: THREAD,
                });
            }

            ctx.layer();

            for (idx, fragment) in fragments.iter().enumerate() {
                let is_selected = idx == selected;
                let is_oracle = fragment.id == "oracle";

                let marker = if is_oracle {
                    // The oracle node breathes
                    ["✦", "✧", "·"][pulse as usize % 3]
                } else if is_selected {
                    "◆"
                } else {
                    "◇"
                };

                let mut style = if is_selected {
                    Style::default().fg(GOLD).bold()
                } else if is_oracle {
                    Style::default().fg(GOLD)
                } else {
                    Style::default().fg(Color::DarkGray)
                };
                // The larger monuments of the path carry more weight
                if fragment.scale >= 1.2 {
                    style = style.add_modifier(Modifier::BOLD);
                }

                ctx.print(
                    fragment.x,
                    100.0 - fragment.y,
                    Line::from(Span::styled(
                        format!("{} {}", marker, fragment.label.to_uppercase()),
                        style,
                    )),
                );

                if is_selected {
                    // The era label leans the way its node tilts
                    ctx.print(
                        (fragment.x + fragment.rotation / 2.0).clamp(0.0, 100.0),
                        (100.0 - fragment.y + 4.0).min(100.0),
                        Line::from(Span::styled(
                            fragment.era.clone(),
                            Style::default().fg(Color::DarkGray).italic(),
                        )),
                    );
                }
            }

            // Anchor text, bottom left like the source layout
            ctx.print(
                1.0,
                1.0,
                Line::from(Span::styled(
                    "I L   V I T T O R I A L E",
                    Style::default().fg(THREAD),
                )),
            );
        });

    frame.render_widget(canvas, area);
}

fn accent(layout: Layout) -> Color {
    match layout {
        Layout::Archive | Layout::Verse | Layout::Gallery | Layout::Oracle => GOLD,
        Layout::Tome => Color::Rgb(170, 120, 160),
        Layout::Muse => Color::Magenta,
        Layout::Reel => Color::Gray,
        Layout::Nocturne => Color::DarkGray,
        Layout::Manifesto => Color::Red,
    }
}

fn render_manifestation(app: &mut App, frame: &mut Frame, area: Rect) {
    let Some(fragment) = app.open_fragment().cloned() else {
        return;
    };
    let timeline = app.atlas.timeline();
    let animation_frame = app.animation_frame;
    let input_mode = app.input_mode;
    let Some(overlay) = app.open.as_mut() else {
        return;
    };

    if overlay.layout == Layout::Oracle {
        render_oracle(overlay, &fragment, frame, area, animation_frame, input_mode);
        return;
    }

    let accent = accent(overlay.layout);
    let outer = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(accent))
        .title(format!(
            " {} — {} ",
            overlay.layout.heading(),
            fragment.label
        ))
        .title_alignment(Alignment::Center);
    let inner = outer.inner(area);
    frame.render_widget(outer, area);

    let [body_area, bar_area] =
        UiLayout::vertical([Constraint::Min(0), Constraint::Length(1)]).areas(inner);

    if overlay.revealed && fragment.analysis.is_some() {
        // Revealed exegesis takes a side panel
        let [page_area, analysis_area] =
            UiLayout::horizontal([Constraint::Percentage(60), Constraint::Percentage(40)])
                .areas(body_area);
        render_page(overlay, &fragment, frame, page_area, accent);
        render_analysis(&fragment, frame, analysis_area, accent);
    } else if overlay.layout == Layout::Archive {
        // The archive carries the chronicle of the whole path beside it
        let [page_area, chronicle_area] =
            UiLayout::horizontal([Constraint::Percentage(70), Constraint::Percentage(30)])
                .areas(body_area);
        render_page(overlay, &fragment, frame, page_area, accent);
        render_chronicle(&timeline, &fragment.label, frame, chronicle_area, accent);
    } else {
        render_page(overlay, &fragment, frame, body_area, accent);
    }

    render_page_bar(overlay, &fragment, frame, bar_area, accent);
}

fn render_page(
    overlay: &Manifestation,
    fragment: &Fragment,
    frame: &mut Frame,
    area: Rect,
    accent: Color,
) {
    let page_idx = overlay.pager.page();

    let text = match overlay.layout {
        Layout::Gallery if !fragment.gallery.is_empty() => {
            let entry = &fragment.gallery[page_idx.min(fragment.gallery.len() - 1)];
            let mut lines = vec![
                Line::default(),
                Line::from(Span::styled(
                    entry.title.to_uppercase(),
                    Style::default().fg(accent).bold(),
                )),
                Line::default(),
                Line::from(Span::styled(
                    entry.description.clone(),
                    Style::default().fg(PARCHMENT),
                )),
                Line::default(),
                Line::from(Span::styled(
                    entry.image.clone(),
                    Style::default().fg(Color::DarkGray).underlined(),
                )),
            ];
            if let Some(first) = fragment.pages.first() {
                lines.push(Line::default());
                lines.push(Line::from(Span::styled(
                    first.clone(),
                    Style::default().fg(PARCHMENT).italic(),
                )));
            }
            Text::from(lines)
        }
        _ => {
            let page = fragment
                .pages
                .get(page_idx)
                .map(String::as_str)
                .unwrap_or("");
            let style = match overlay.layout {
                Layout::Verse => Style::default().fg(GOLD).italic(),
                Layout::Nocturne => Style::default().fg(Color::Gray),
                Layout::Manifesto => Style::default().fg(PARCHMENT).bold(),
                _ => Style::default().fg(PARCHMENT),
            };
            let mut lines: Vec<Line> = vec![Line::default()];
            for line in page.lines() {
                lines.push(Line::from(Span::styled(line.to_string(), style)));
            }
            if page_idx == 0 {
                if let Some(image) = &fragment.image {
                    lines.push(Line::default());
                    lines.push(Line::from(Span::styled(
                        image.clone(),
                        Style::default().fg(Color::DarkGray).underlined(),
                    )));
                }
            }
            Text::from(lines)
        }
    };

    let alignment = match overlay.layout {
        Layout::Verse | Layout::Gallery => Alignment::Center,
        _ => Alignment::Left,
    };

    let paragraph = Paragraph::new(text)
        .wrap(Wrap { trim: false })
        .alignment(alignment)
        .block(Block::default().padding(Padding::horizontal(2)));
    frame.render_widget(paragraph, area);
}

fn render_analysis(fragment: &Fragment, frame: &mut Frame, area: Rect, accent: Color) {
    let Some(analysis) = fragment.analysis.as_ref() else {
        return;
    };

    let block = Block::default()
        .borders(Borders::LEFT)
        .border_style(Style::default().fg(accent))
        .title(format!(" {} ", analysis.title))
        .padding(Padding::horizontal(1));

    let mut lines: Vec<Line> = vec![Line::default()];
    for paragraph in &analysis.paragraphs {
        lines.push(Line::from(Span::styled(
            paragraph.clone(),
            Style::default().fg(Color::Gray).italic(),
        )));
        lines.push(Line::default());
    }

    let panel = Paragraph::new(Text::from(lines))
        .wrap(Wrap { trim: false })
        .block(block);
    frame.render_widget(panel, area);
}

fn render_chronicle(
    timeline: &[TimelineEntry],
    current_label: &str,
    frame: &mut Frame,
    area: Rect,
    accent: Color,
) {
    let block = Block::default()
        .borders(Borders::LEFT)
        .border_style(Style::default().fg(accent))
        .title(" Cronologia ")
        .padding(Padding::horizontal(1));

    let mut lines: Vec<Line> = vec![Line::default()];
    for entry in timeline {
        let style = if entry.title == current_label {
            Style::default().fg(accent).bold()
        } else {
            Style::default().fg(Color::DarkGray)
        };
        lines.push(Line::from(vec![
            Span::styled(format!("{:<6}", entry.year), style),
            Span::styled(entry.title.clone(), style),
        ]));
    }

    let panel = Paragraph::new(Text::from(lines)).block(block);
    frame.render_widget(panel, area);
}

fn render_page_bar(
    overlay: &Manifestation,
    fragment: &Fragment,
    frame: &mut Frame,
    area: Rect,
    accent: Color,
) {
    // The nocturne counts its strips of paper, the reel its frames
    let counter_label = match overlay.layout {
        Layout::Nocturne => format!(
            "Cartiglio {} di {}",
            overlay.pager.page() + 1,
            overlay.pager.len().max(1)
        ),
        Layout::Reel => format!(
            "Fotogramma {} / {}",
            overlay.pager.page() + 1,
            overlay.pager.len().max(1)
        ),
        _ => overlay.pager.counter(),
    };

    let counter_width = (counter_label.chars().count() + 2) as u16;
    let [meta_area, counter_area] =
        UiLayout::horizontal([Constraint::Min(0), Constraint::Length(counter_width)]).areas(area);

    let analysis_hint = if fragment.analysis.is_some() {
        if overlay.revealed {
            "  [a] chiudi esegesi"
        } else {
            "  [a] esegesi"
        }
    } else {
        ""
    };

    let meta = Line::from(vec![
        Span::styled(
            format!(" {}", fragment.meta.clone().unwrap_or_default()),
            Style::default().fg(Color::DarkGray),
        ),
        Span::styled(analysis_hint, Style::default().fg(Color::DarkGray)),
    ]);
    frame.render_widget(Paragraph::new(meta), meta_area);

    let counter = Paragraph::new(Line::from(Span::styled(
        format!("{counter_label} "),
        Style::default().fg(accent),
    )))
    .alignment(Alignment::Right);
    frame.render_widget(counter, counter_area);
}

/// The daimon occasionally answers with **emphasis**; render it bold.
fn styled_reply_line(text: &str, accent: Color) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    for (i, piece) in text.split("**").enumerate() {
        if piece.is_empty() {
            continue;
        }
        let style = if i % 2 == 1 {
            Style::default().fg(accent).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(accent)
        };
        spans.push(Span::styled(piece.to_string(), style));
    }
    if spans.is_empty() {
        Line::default()
    } else {
        Line::from(spans)
    }
}

fn render_oracle(
    overlay: &mut Manifestation,
    fragment: &Fragment,
    frame: &mut Frame,
    area: Rect,
    animation_frame: u8,
    input_mode: InputMode,
) {
    let outer = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(GOLD))
        .title(format!(
            " {} — {} ",
            Layout::Oracle.heading(),
            fragment.label
        ))
        .title_alignment(Alignment::Center);
    let inner = outer.inner(area);
    frame.render_widget(outer, area);

    let [chat_area, input_area] =
        UiLayout::vertical([Constraint::Min(0), Constraint::Length(2)]).areas(inner);

    // Store chat dimensions for the autoscroll estimate
    overlay.chat_height = chat_area.height;
    overlay.chat_width = chat_area.width.saturating_sub(2);

    let session = overlay.oracle.as_ref();
    let turns = session.map(|s| s.turns()).unwrap_or_default();
    let pending = session.is_some_and(|s| s.is_pending());

    let chat_text = if turns.is_empty() && !pending {
        Text::from(vec![
            Line::default(),
            Line::from(Span::styled(
                "Chiedi all'Ombra",
                Style::default().fg(GOLD).dim().italic(),
            ))
            .centered(),
        ])
    } else {
        let mut lines: Vec<Line> = Vec::new();
        for turn in turns {
            match turn.role {
                Role::User => {
                    for line in turn.text.lines() {
                        lines.push(
                            Line::from(Span::styled(
                                line.to_string(),
                                Style::default().fg(PARCHMENT).dim().italic(),
                            ))
                            .right_aligned(),
                        );
                    }
                    lines.push(Line::default());
                }
                Role::Daimon => {
                    for line in turn.text.lines() {
                        lines.push(styled_reply_line(line, GOLD));
                    }
                    lines.push(Line::from(Span::styled(
                        "────",
                        Style::default().fg(BLOOD),
                    )));
                    lines.push(Line::default());
                }
            }
        }

        if pending {
            let dots = ".".repeat((animation_frame as usize % 3) + 1);
            lines.push(Line::from(Span::styled(
                format!("IL VATE RIMEMBRA{dots}"),
                Style::default().fg(BLOOD).italic(),
            )));
        }

        Text::from(lines)
    };

    let chat = Paragraph::new(chat_text)
        .wrap(Wrap { trim: false })
        .scroll((overlay.chat_scroll, 0))
        .block(Block::default().padding(Padding::horizontal(1)));
    frame.render_widget(chat, chat_area);

    // Question line at the bottom
    let editing = input_mode == InputMode::Editing;
    let input_block = Block::default()
        .borders(Borders::TOP)
        .border_style(Style::default().fg(if editing { GOLD } else { Color::DarkGray }));

    let inner_width = input_area.width.saturating_sub(2) as usize;
    let cursor_pos = overlay.cursor;
    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };
    let visible_text: String = overlay
        .input
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(PARCHMENT))
        .block(input_block);
    frame.render_widget(input, input_area);

    if editing {
        frame.set_cursor_position((
            input_area.x + (cursor_pos - scroll_offset) as u16,
            input_area.y + 1,
        ));
    }
}
