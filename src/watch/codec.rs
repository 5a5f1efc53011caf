//! Translation between event/type specs typed by people and kernel bitmasks.
//!
//! Event specs are either letter codes (`"CU"`) or free text
//! (`"create, update"`, `"create and update"`). Both reduce to the same
//! [`EventMask`]. An unusable spec falls back to [`EventMask::DEFAULT`] so a
//! watch can always fire.

use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Kernel inotify event bits (`linux/inotify.h`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct EventMask: u32 {
        const ACCESS = libc::IN_ACCESS;
        const MODIFY = libc::IN_MODIFY;
        const ATTRIB = libc::IN_ATTRIB;
        const MOVED_FROM = libc::IN_MOVED_FROM;
        const MOVED_TO = libc::IN_MOVED_TO;
        const MOVE = libc::IN_MOVED_FROM | libc::IN_MOVED_TO;
        const CREATE = libc::IN_CREATE;
        const DELETE = libc::IN_DELETE;
        const DELETE_SELF = libc::IN_DELETE_SELF;
        const MOVE_SELF = libc::IN_MOVE_SELF;
        const UNMOUNT = libc::IN_UNMOUNT;
        const Q_OVERFLOW = libc::IN_Q_OVERFLOW;
        const IGNORED = libc::IN_IGNORED;
        const ISDIR = libc::IN_ISDIR;

        // Records may carry bits this crate does not name.
        const _ = !0;
    }
}

impl EventMask {
    /// Mask used when a spec names nothing recognisable.
    pub const DEFAULT: EventMask = EventMask::CREATE.union(EventMask::DELETE);

    /// Whether the kernel flagged the affected entry as a directory.
    pub fn is_dir(self) -> bool {
        self.contains(EventMask::ISDIR)
    }
}

/// Semantic event categories a watch can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Create,
    Read,
    Update,
    Attribute,
    Move,
    Delete,
}

impl EventKind {
    /// All kinds in the stable order used for rendering.
    pub const ALL: [EventKind; 6] = [
        EventKind::Create,
        EventKind::Read,
        EventKind::Update,
        EventKind::Attribute,
        EventKind::Move,
        EventKind::Delete,
    ];

    pub fn letter(self) -> char {
        match self {
            EventKind::Create => 'C',
            EventKind::Read => 'R',
            EventKind::Update => 'U',
            EventKind::Attribute => 'A',
            EventKind::Move => 'M',
            EventKind::Delete => 'D',
        }
    }

    /// Human-readable name used in notifications and listings.
    pub fn description(self) -> &'static str {
        match self {
            EventKind::Create => "create",
            EventKind::Read => "access/read",
            EventKind::Update => "update",
            EventKind::Attribute => "attribute (change)",
            EventKind::Move => "move",
            EventKind::Delete => "delete",
        }
    }

    pub fn mask(self) -> EventMask {
        match self {
            EventKind::Create => EventMask::CREATE,
            EventKind::Read => EventMask::ACCESS,
            EventKind::Update => EventMask::MODIFY,
            EventKind::Attribute => EventMask::ATTRIB,
            EventKind::Move => EventMask::MOVE,
            EventKind::Delete => EventMask::DELETE,
        }
    }

    pub fn from_letter(letter: char) -> Option<EventKind> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.letter() == letter.to_ascii_uppercase())
    }

    /// Kinds whose bits overlap `mask`, in stable order.
    pub fn in_mask(mask: EventMask) -> impl Iterator<Item = EventKind> {
        EventKind::ALL
            .into_iter()
            .filter(move |kind| mask.intersects(kind.mask()))
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.description(), self.letter())
    }
}

/// Restricts which entries a watch reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryFilter {
    #[default]
    Any,
    FileOnly,
    DirectoryOnly,
}

impl EntryFilter {
    /// Numeric form accepted by [`parse_entry_filter`].
    pub fn code(self) -> u8 {
        match self {
            EntryFilter::Any => 1,
            EntryFilter::FileOnly => 2,
            EntryFilter::DirectoryOnly => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<EntryFilter> {
        match code {
            1 => Some(EntryFilter::Any),
            2 => Some(EntryFilter::FileOnly),
            3 => Some(EntryFilter::DirectoryOnly),
            _ => None,
        }
    }

    /// Short letter shown in listings (`F`, `D`, or empty for any).
    pub fn letter(self) -> &'static str {
        match self {
            EntryFilter::Any => "",
            EntryFilter::FileOnly => "F",
            EntryFilter::DirectoryOnly => "D",
        }
    }

    /// Whether an entry with the given directory-ness passes the filter.
    pub fn admits(self, is_dir: bool) -> bool {
        match self {
            EntryFilter::Any => true,
            EntryFilter::FileOnly => !is_dir,
            EntryFilter::DirectoryOnly => is_dir,
        }
    }
}

fn is_separator(c: char) -> bool {
    c.is_whitespace() || matches!(c, ',' | '.' | ':' | ';' | '-' | '+')
}

/// Reduce free text to the uppercased first letters of its words,
/// keeping only letters in `alphabet`. The word "and" is skipped.
fn letter_mask(text: &str, alphabet: &[char]) -> Vec<char> {
    text.split(is_separator)
        .filter(|word| !word.is_empty() && !word.eq_ignore_ascii_case("and"))
        .filter_map(|word| word.chars().next())
        .map(|c| c.to_ascii_uppercase())
        .filter(|c| alphabet.contains(c))
        .collect()
}

/// Letters of `spec` if it consists solely of codes from `alphabet`.
fn bare_letters(spec: &str, alphabet: &[char]) -> Option<Vec<char>> {
    let letters: Vec<char> = spec.trim().chars().map(|c| c.to_ascii_uppercase()).collect();
    if !letters.is_empty() && letters.iter().all(|c| alphabet.contains(c)) {
        Some(letters)
    } else {
        None
    }
}

fn reduce(spec: &str, alphabet: &[char]) -> Vec<char> {
    bare_letters(spec, alphabet).unwrap_or_else(|| letter_mask(spec, alphabet))
}

/// Parse an event spec into a kernel mask.
///
/// Never returns an empty mask.
pub fn parse_mask(spec: &str) -> EventMask {
    let alphabet: Vec<char> = EventKind::ALL.iter().map(|kind| kind.letter()).collect();

    let mask = reduce(spec, &alphabet)
        .into_iter()
        .filter_map(EventKind::from_letter)
        .fold(EventMask::empty(), |mask, kind| mask | kind.mask());

    if mask.is_empty() {
        EventMask::DEFAULT
    } else {
        mask
    }
}

/// Short letter-code form of a mask, e.g. `"CD"`.
pub fn mask_to_letters(mask: EventMask) -> String {
    EventKind::in_mask(mask).map(EventKind::letter).collect()
}

/// Sentence form of a mask, e.g. `"create, update and delete"`.
pub fn mask_to_words(mask: EventMask) -> String {
    let words: Vec<&str> = EventKind::in_mask(mask).map(EventKind::description).collect();

    match words.as_slice() {
        [] => String::new(),
        [only] => (*only).to_string(),
        [init @ .., last] => format!("{} and {last}", init.join(", ")),
    }
}

/// Parse an entry-type spec: `1`-`3`, or text mentioning files/directories.
pub fn parse_entry_filter(spec: &str) -> EntryFilter {
    if let Some(filter) = spec.trim().parse::<u8>().ok().and_then(EntryFilter::from_code) {
        return filter;
    }

    let letters = reduce(spec, &['F', 'D']);
    let files = letters.contains(&'F');
    let dirs = letters.contains(&'D');

    match (files, dirs) {
        (true, false) => EntryFilter::FileOnly,
        (false, true) => EntryFilter::DirectoryOnly,
        _ => EntryFilter::Any,
    }
}
