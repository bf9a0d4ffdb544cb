//! Word letters and modal groups, with bitsets to track them per line

/// Value word letters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Word {
    E = 0,
    F = 1,
    I = 2,
    J = 3,
    K = 4,
    L = 5,
    N = 6,
    P = 7,
    Q = 8,
    R = 9,
    S = 10,
    T = 11,
    X = 12,
    Y = 13,
    Z = 14,
    A = 15,
    B = 16,
    C = 17,
}

impl Word {
    /// Map a letter to its word, if it is a value word
    pub fn from_letter(letter: u8) -> Option<Self> {
        Some(match letter {
            b'E' => Word::E,
            b'F' => Word::F,
            b'I' => Word::I,
            b'J' => Word::J,
            b'K' => Word::K,
            b'L' => Word::L,
            b'N' => Word::N,
            b'P' => Word::P,
            b'Q' => Word::Q,
            b'R' => Word::R,
            b'S' => Word::S,
            b'T' => Word::T,
            b'X' => Word::X,
            b'Y' => Word::Y,
            b'Z' => Word::Z,
            b'A' => Word::A,
            b'B' => Word::B,
            b'C' => Word::C,
            _ => return None,
        })
    }

    /// Axis index for X..C
    pub fn axis_index(self) -> Option<usize> {
        match self {
            Word::X => Some(0),
            Word::Y => Some(1),
            Word::Z => Some(2),
            Word::A => Some(3),
            Word::B => Some(4),
            Word::C => Some(5),
            _ => None,
        }
    }

    /// Arc offset index for I/J/K
    pub fn offset_index(self) -> Option<usize> {
        match self {
            Word::I => Some(0),
            Word::J => Some(1),
            Word::K => Some(2),
            _ => None,
        }
    }

    /// F, N, P, S and T may not be negative
    pub fn is_non_negative(self) -> bool {
        matches!(self, Word::F | Word::N | Word::P | Word::S | Word::T)
    }
}

/// Value words seen on a line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WordSet(u32);

impl WordSet {
    const AXES: u32 = (1 << Word::X as u32)
        | (1 << Word::Y as u32)
        | (1 << Word::Z as u32)
        | (1 << Word::A as u32)
        | (1 << Word::B as u32)
        | (1 << Word::C as u32);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn contains(self, word: Word) -> bool {
        self.0 & (1 << word as u32) != 0
    }

    pub fn insert(&mut self, word: Word) {
        self.0 |= 1 << word as u32;
    }

    pub fn remove(&mut self, word: Word) {
        self.0 &= !(1 << word as u32);
    }

    /// Drop X..C
    pub fn remove_axes(&mut self) {
        self.0 &= !Self::AXES;
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// Modal groups
///
/// A line may hold at most one command from each group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ModalGroup {
    /// G4 G10 G28 G28.1 G30 G30.1 G53 G92 G92.1
    NonModal = 0,
    /// G0 G1 G2 G3 G38.x G80
    Motion = 1,
    /// G17 G18 G19
    Plane = 2,
    /// G90 G91
    Distance = 3,
    /// G91.1
    ArcDistance = 4,
    /// G93 G94
    FeedMode = 5,
    /// G20 G21
    Units = 6,
    /// G40
    CutterComp = 7,
    /// G43.1 G49
    ToolLength = 8,
    /// G54-G59
    CoordSelect = 9,
    /// G61
    PathControl = 10,
    /// M0 M1 M2 M30
    Stopping = 11,
    /// M6
    ToolChange = 12,
    /// M3 M4 M5
    Spindle = 13,
    /// M7 M8 M9
    Coolant = 14,
    /// M56
    OverrideControl = 15,
    /// M62-M68
    UserIo = 16,
}

/// Modal groups commanded on a line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GroupSet(u32);

impl GroupSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn contains(self, group: ModalGroup) -> bool {
        self.0 & (1 << group as u32) != 0
    }

    /// Record `group`. Returns false if it was already commanded.
    pub fn insert(&mut self, group: ModalGroup) -> bool {
        let bit = 1 << group as u32;
        let fresh = self.0 & bit == 0;
        self.0 |= bit;
        fresh
    }

    /// Any group outside `allowed` present
    pub fn any_except(self, allowed: &[ModalGroup]) -> bool {
        let mask = allowed.iter().fold(0u32, |acc, g| acc | (1 << *g as u32));
        self.0 & !mask != 0
    }
}
