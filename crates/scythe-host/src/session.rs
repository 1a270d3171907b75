//! In-memory model of the host's open project.
//!
//! Handlers never touch this state except through a [`Session`], which
//! records every mutation into the undo block the Dispatcher opened for the
//! current command.

use std::collections::VecDeque;

/// MIDI ticks per quarter note.
pub const PPQ: u32 = 960;

pub const DEFAULT_TEMPO: f64 = 120.0;

/// Undo steps kept; older ones fall off the front.
pub const UNDO_HISTORY_LIMIT: usize = 1_000;

/// Transport state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayState {
    #[default]
    Stopped,
    Playing,
    Paused,
    Recording,
}

impl PlayState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlayState::Stopped => "stopped",
            PlayState::Playing => "playing",
            PlayState::Paused => "paused",
            PlayState::Recording => "recording",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    pub pitch: u8,
    pub velocity: u8,
    pub channel: u8,
    pub start_tick: i64,
    pub length_ticks: i64,
}

/// A MIDI item on a track. Position and length are in seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct MidiItem {
    pub position: f64,
    pub length: f64,
    pub notes: Vec<Note>,
}

impl MidiItem {
    pub fn end(&self) -> f64 {
        self.position + self.length
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    /// Stable identity; survives reordering, unlike the index
    pub id: u64,
    pub name: String,
    /// Linear gain, 1.0 is unity
    pub volume: f64,
    pub pan: f64,
    pub muted: bool,
    pub solo: bool,
    pub armed: bool,
    pub selected: bool,
    pub fx: Vec<String>,
    pub items: Vec<MidiItem>,
}

impl Track {
    fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            volume: 1.0,
            pan: 0.0,
            muted: false,
            solo: false,
            armed: false,
            selected: false,
            fx: Vec::new(),
            items: Vec::new(),
        }
    }
}

/// One user-visible undo step.
#[derive(Debug, Clone, PartialEq)]
pub struct UndoEntry {
    pub label: String,
    pub changes: Vec<String>,
}

#[derive(Debug, Default)]
struct UndoLog {
    entries: VecDeque<UndoEntry>,
    open: Option<Vec<String>>,
    depth: u32,
}

impl UndoLog {
    fn push(&mut self, entry: UndoEntry) {
        if self.entries.len() == UNDO_HISTORY_LIMIT {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }
}

/// Effects known to the host's plugin scanner.
pub const PLUGIN_CATALOG: &[(&str, &str)] = &[
    ("ReaSynth", "VSTi"),
    ("ReaEQ", "VST"),
    ("ReaComp", "VST"),
    ("ReaVerbate", "VST"),
    ("ReaDelay", "VST"),
    ("ReaSamplOmatic5000", "VSTi"),
];

/// Display name the host shows in an FX chain, e.g. `VST: ReaEQ (Cockos)`.
pub fn plugin_display_name(name: &str, kind: &str) -> String {
    format!("{}: {} (Cockos)", kind, name)
}

/// Resolve a user-supplied plugin name against the catalog.
///
/// Accepts the bare name or the display name, case-insensitively.
pub fn find_plugin(query: &str) -> Option<(&'static str, &'static str)> {
    let query = query.trim();
    PLUGIN_CATALOG.iter().copied().find(|(name, kind)| {
        name.eq_ignore_ascii_case(query)
            || plugin_display_name(name, kind).eq_ignore_ascii_case(query)
    })
}

/// Named host actions and their command ids.
pub const ACTIONS: &[(&str, u32)] = &[
    ("play", 1007),
    ("pause", 1008),
    ("record", 1013),
    ("stop", 1016),
    ("insert_track", 40001),
    ("delete_track", 40005),
    ("goto_start", 40042),
    ("goto_end", 40043),
    ("duplicate_track", 40062),
    ("select_all_tracks", 40296),
];

pub fn action_id(name: &str) -> Option<u32> {
    ACTIONS
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, id)| *id)
}

/// The open project.
#[derive(Debug)]
pub struct Session {
    tempo: f64,
    time_signature: (u32, u32),
    play_state: PlayState,
    cursor: f64,
    tracks: Vec<Track>,
    next_track_id: u64,
    console: String,
    undo: UndoLog,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            tempo: DEFAULT_TEMPO,
            time_signature: (4, 4),
            play_state: PlayState::Stopped,
            cursor: 0.0,
            tracks: Vec::new(),
            next_track_id: 1,
            console: String::new(),
            undo: UndoLog::default(),
        }
    }

    // --- undo bracketing ---

    /// Open an undo block. Blocks nest; only the outermost one is recorded.
    pub fn begin_undo_block(&mut self) {
        if self.undo.depth == 0 {
            self.undo.open = Some(Vec::new());
        }
        self.undo.depth += 1;
    }

    /// Close the current block. The outermost close appends one entry if
    /// anything changed inside it.
    pub fn end_undo_block(&mut self, label: &str) {
        if self.undo.depth == 0 {
            return;
        }
        self.undo.depth -= 1;
        if self.undo.depth > 0 {
            return;
        }
        if let Some(changes) = self.undo.open.take() {
            if !changes.is_empty() {
                self.undo.push(UndoEntry {
                    label: label.to_string(),
                    changes,
                });
            }
        }
    }

    /// Oldest first, at most [`UNDO_HISTORY_LIMIT`] entries.
    pub fn undo_history(&self) -> &VecDeque<UndoEntry> {
        &self.undo.entries
    }

    fn record(&mut self, change: impl Into<String>) {
        let change = change.into();
        match self.undo.open.as_mut() {
            Some(open) => open.push(change),
            None => self.undo.push(UndoEntry {
                label: change.clone(),
                changes: vec![change],
            }),
        }
    }

    // --- project ---

    pub fn tempo(&self) -> f64 {
        self.tempo
    }

    pub fn set_tempo(&mut self, bpm: f64) {
        self.tempo = bpm;
        self.record(format!("tempo {}", bpm));
    }

    pub fn time_signature(&self) -> (u32, u32) {
        self.time_signature
    }

    pub fn set_time_signature(&mut self, numerator: u32, denominator: u32) {
        self.time_signature = (numerator, denominator);
        self.record(format!("time signature {}/{}", numerator, denominator));
    }

    pub fn play_state(&self) -> PlayState {
        self.play_state
    }

    /// Transport changes are not undoable.
    pub fn set_play_state(&mut self, state: PlayState) {
        self.play_state = state;
    }

    pub fn cursor(&self) -> f64 {
        self.cursor
    }

    pub fn set_cursor(&mut self, seconds: f64) {
        self.cursor = seconds.max(0.0);
    }

    /// End of the last item, in seconds.
    pub fn project_end(&self) -> f64 {
        self.tracks
            .iter()
            .flat_map(|t| t.items.iter())
            .map(MidiItem::end)
            .fold(0.0, f64::max)
    }

    pub fn beats_to_seconds(&self, beats: f64) -> f64 {
        beats * 60.0 / self.tempo
    }

    // --- tracks ---

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn track(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    pub fn track_index_by_id(&self, id: u64) -> Option<usize> {
        self.tracks.iter().position(|t| t.id == id)
    }

    /// Insert a track at `index` (clamped to the end) and return its index.
    pub fn insert_track(&mut self, index: Option<usize>, name: &str) -> usize {
        let index = index.unwrap_or(self.tracks.len()).min(self.tracks.len());
        let track = Track::new(self.next_track_id, name);
        self.next_track_id += 1;
        self.tracks.insert(index, track);
        self.record(format!("insert track {} \"{}\"", index, name));
        index
    }

    /// Mutable access to one track; `what` is recorded as the change.
    pub fn edit_track(&mut self, index: usize, what: &str) -> Option<&mut Track> {
        if index >= self.tracks.len() {
            return None;
        }
        self.record(format!("track {}: {}", index, what));
        self.tracks.get_mut(index)
    }

    /// Select exactly one track.
    pub fn select_only(&mut self, index: usize) -> bool {
        if index >= self.tracks.len() {
            return false;
        }
        for (i, track) in self.tracks.iter_mut().enumerate() {
            track.selected = i == index;
        }
        self.record(format!("select track {}", index));
        true
    }

    pub fn selected_indices(&self) -> Vec<usize> {
        self.tracks
            .iter()
            .enumerate()
            .filter(|(_, t)| t.selected)
            .map(|(i, _)| i)
            .collect()
    }

    /// Append a MIDI item to a track and return its index on that track.
    pub fn insert_midi_item(&mut self, track: usize, position: f64, length: f64) -> Option<usize> {
        let t = self.edit_track(track, "insert midi item")?;
        t.items.push(MidiItem {
            position,
            length,
            notes: Vec::new(),
        });
        Some(t.items.len() - 1)
    }

    pub fn item(&self, track: usize, item: usize) -> Option<&MidiItem> {
        self.tracks.get(track)?.items.get(item)
    }

    pub fn add_notes(&mut self, track: usize, item: usize, notes: Vec<Note>) -> Option<usize> {
        self.item(track, item)?;
        let count = notes.len();
        let t = self.edit_track(track, &format!("add {} notes to item {}", count, item))?;
        let target = t.items.get_mut(item)?;
        target.notes.extend(notes);
        target.notes.sort_by_key(|n| n.start_tick);
        Some(count)
    }

    /// Add a catalog plugin to a track's FX chain and return its slot.
    pub fn add_fx(&mut self, track: usize, display_name: &str) -> Option<usize> {
        let t = self.edit_track(track, &format!("add fx {}", display_name))?;
        t.fx.push(display_name.to_string());
        Some(t.fx.len() - 1)
    }

    // --- console ---

    pub fn show_console_msg(&mut self, msg: &str) {
        self.console.push_str(msg);
    }

    /// Drain console output written since the last call.
    pub fn take_console(&mut self) -> String {
        std::mem::take(&mut self.console)
    }

    // --- actions ---

    /// Run a host action by id. Returns false for unknown ids.
    pub fn run_action(&mut self, id: u32) -> bool {
        match id {
            1007 => self.set_play_state(PlayState::Playing),
            1008 => {
                let next = match self.play_state {
                    PlayState::Paused => PlayState::Playing,
                    _ => PlayState::Paused,
                };
                self.set_play_state(next);
            }
            1013 => self.set_play_state(PlayState::Recording),
            1016 => self.set_play_state(PlayState::Stopped),
            40001 => {
                let after = self.selected_indices().last().map(|i| i + 1);
                let index = self.insert_track(after, "");
                self.select_only(index);
            }
            40005 => {
                let before = self.tracks.len();
                self.tracks.retain(|t| !t.selected);
                let removed = before - self.tracks.len();
                if removed > 0 {
                    self.record(format!("remove {} tracks", removed));
                }
            }
            40042 => self.set_cursor(0.0),
            40043 => {
                let end = self.project_end();
                self.set_cursor(end);
            }
            40062 => {
                for index in self.selected_indices().into_iter().rev() {
                    let mut copy = self.tracks[index].clone();
                    copy.id = self.next_track_id;
                    copy.selected = false;
                    self.next_track_id += 1;
                    self.tracks.insert(index + 1, copy);
                    self.record(format!("duplicate track {}", index));
                }
            }
            40296 => {
                for track in &mut self.tracks {
                    track.selected = true;
                }
                self.record("select all tracks");
            }
            _ => return false,
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_block_groups_changes_into_one_entry() {
        let mut session = Session::new();
        session.begin_undo_block();
        session.insert_track(None, "Drums");
        session.set_tempo(96.0);
        session.end_undo_block("build");

        assert_eq!(session.undo_history().len(), 1);
        assert_eq!(session.undo_history()[0].label, "build");
        assert_eq!(session.undo_history()[0].changes.len(), 2);
    }

    #[test]
    fn test_empty_block_records_nothing() {
        let mut session = Session::new();
        session.begin_undo_block();
        session.set_play_state(PlayState::Playing);
        session.end_undo_block("play");
        assert!(session.undo_history().is_empty());
    }

    #[test]
    fn test_nested_blocks_collapse() {
        let mut session = Session::new();
        session.begin_undo_block();
        session.begin_undo_block();
        session.set_tempo(100.0);
        session.end_undo_block("inner");
        session.set_tempo(101.0);
        session.end_undo_block("outer");

        assert_eq!(session.undo_history().len(), 1);
        assert_eq!(session.undo_history()[0].label, "outer");
    }

    #[test]
    fn test_undo_history_keeps_newest_entries() {
        let mut session = Session::new();
        for i in 0..UNDO_HISTORY_LIMIT + 5 {
            session.begin_undo_block();
            session.set_tempo(60.0 + (i % 100) as f64);
            session.end_undo_block(&format!("step {}", i));
        }

        let history = session.undo_history();
        assert_eq!(history.len(), UNDO_HISTORY_LIMIT);
        assert_eq!(history[0].label, "step 5");
        assert_eq!(
            history.back().map(|e| e.label.as_str()),
            Some(format!("step {}", UNDO_HISTORY_LIMIT + 4).as_str())
        );
    }

    #[test]
    fn test_insert_track_clamps_index() {
        let mut session = Session::new();
        assert_eq!(session.insert_track(Some(10), "A"), 0);
        assert_eq!(session.insert_track(Some(0), "B"), 0);
        assert_eq!(session.track(1).map(|t| t.name.as_str()), Some("A"));
        assert_ne!(session.track(0).map(|t| t.id), session.track(1).map(|t| t.id));
    }

    #[test]
    fn test_notes_stay_sorted() {
        let mut session = Session::new();
        session.insert_track(None, "Keys");
        session.insert_midi_item(0, 0.0, 2.0);
        let note = |start| Note {
            pitch: 60,
            velocity: 100,
            channel: 0,
            start_tick: start,
            length_ticks: 240,
        };
        assert_eq!(session.add_notes(0, 0, vec![note(960), note(0)]), Some(2));
        let ticks: Vec<i64> = session.item(0, 0).unwrap().notes.iter().map(|n| n.start_tick).collect();
        assert_eq!(ticks, vec![0, 960]);
        assert_eq!(session.add_notes(0, 3, vec![note(0)]), None);
    }

    #[test]
    fn test_actions() {
        let mut session = Session::new();
        session.insert_track(None, "A");
        session.select_only(0);
        assert!(session.run_action(40062));
        assert_eq!(session.track_count(), 2);

        assert!(session.run_action(40296));
        assert!(session.run_action(40005));
        assert_eq!(session.track_count(), 0);

        assert!(session.run_action(1007));
        assert_eq!(session.play_state(), PlayState::Playing);
        assert!(session.run_action(1008));
        assert_eq!(session.play_state(), PlayState::Paused);
        assert!(!session.run_action(12345));
    }

    #[test]
    fn test_goto_end_uses_last_item() {
        let mut session = Session::new();
        session.insert_track(None, "A");
        session.insert_midi_item(0, 2.0, 4.0);
        session.run_action(40043);
        assert_eq!(session.cursor(), 6.0);
        session.run_action(action_id("goto_start").unwrap());
        assert_eq!(session.cursor(), 0.0);
    }

    #[test]
    fn test_find_plugin() {
        assert_eq!(find_plugin("reaeq"), Some(("ReaEQ", "VST")));
        assert_eq!(find_plugin("VSTi: ReaSynth (Cockos)"), Some(("ReaSynth", "VSTi")));
        assert_eq!(find_plugin("Serum"), None);
    }
}
