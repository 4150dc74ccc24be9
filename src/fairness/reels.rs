//! Reel strip, paylines and payout table

use serde::{Deserialize, Serialize};

/// Slot symbols with their stable numeric codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Symbol {
    Empty = 0,
    Cherry = 1,
    Lemon = 2,
    Plum = 3,
    Bar = 4,
    Bell = 5,
    Seven = 6,
    Diamond = 7,
    Wild = 8,
}

impl Symbol {
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Line multiplier for three of a kind, if the symbol pays
    pub fn multiplier(self) -> Option<u64> {
        match self {
            Symbol::Empty => None,
            Symbol::Cherry => Some(2),
            Symbol::Lemon => Some(3),
            Symbol::Plum => Some(5),
            Symbol::Bar => Some(10),
            Symbol::Bell => Some(20),
            Symbol::Seven => Some(50),
            Symbol::Diamond => Some(100),
            Symbol::Wild => Some(500),
        }
    }
}

use Symbol::*;

/// The single circular strip shared by all three reels
pub const MAIN_REEL_STRIP: [Symbol; 32] = [
    Wild, Cherry, Lemon, Plum, Lemon, Bar, Cherry,
    Seven, Lemon, Plum, Cherry, Bell, Plum, Lemon,
    Diamond, Cherry, Plum, Lemon, Bar, Cherry, Lemon,
    Seven, Plum, Lemon, Cherry, Bar, Lemon, Plum,
    Cherry, Bell, Bar, Bell,
];

/// (row, col) coordinates of each evaluated line
pub const PAYLINES: [[(usize, usize); 3]; 5] = [
    [(0, 0), (0, 1), (0, 2)], // top row
    [(1, 0), (1, 1), (1, 2)], // middle row
    [(2, 0), (2, 1), (2, 2)], // bottom row
    [(0, 0), (1, 1), (2, 2)], // top-left to bottom-right
    [(2, 0), (1, 1), (0, 2)], // bottom-left to top-right
];

/// Read the visible 3x3 window: each column starts at its stop offset
pub fn window(stops: &[usize; 3]) -> [[Symbol; 3]; 3] {
    let len = MAIN_REEL_STRIP.len();
    let mut matrix = [[Empty; 3]; 3];
    for (row, cells) in matrix.iter_mut().enumerate() {
        for (col, cell) in cells.iter_mut().enumerate() {
            *cell = MAIN_REEL_STRIP[(stops[col] + row) % len];
        }
    }
    matrix
}

/// Evaluate all paylines, returning the winning line indices and the summed multiplier
pub fn evaluate_lines(matrix: &[[Symbol; 3]; 3]) -> (Vec<usize>, u64) {
    let mut winning = Vec::new();
    let mut total = 0u64;

    for (idx, line) in PAYLINES.iter().enumerate() {
        let [a, b, c] = line.map(|(r, col)| matrix[r][col]);
        if a == b && b == c {
            if let Some(mult) = a.multiplier() {
                total += mult;
                winning.push(idx);
            }
        }
    }

    (winning, total)
}
