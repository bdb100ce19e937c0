use std::fmt;
use std::str::FromStr;

use rkyv::{Archive, Deserialize, Serialize};
use thiserror::Error;

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Archive, Serialize, Deserialize,
)]
pub struct ClientId(u64);

impl ClientId {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl From<u64> for ClientId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Grid coordinates of a piece. For wrapped puzzle types `col` is the angular
/// sector and `row` the height level.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Archive, Serialize, Deserialize,
)]
pub struct PieceId {
    pub row: u16,
    pub col: u16,
}

impl PieceId {
    pub const fn new(col: u16, row: u16) -> Self {
        Self { row, col }
    }
}

impl fmt::Display for PieceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.col, self.row)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PieceIdError {
    #[error("piece id must look like <col>_<row>, got {0:?}")]
    Malformed(String),
}

impl FromStr for PieceId {
    type Err = PieceIdError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let malformed = || PieceIdError::Malformed(value.to_string());
        let (col, row) = value.split_once('_').ok_or_else(malformed)?;
        let col = col.parse::<u16>().map_err(|_| malformed())?;
        let row = row.parse::<u16>().map_err(|_| malformed())?;
        Ok(Self::new(col, row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn piece_id_text_form_parses_back() {
        let id = PieceId::new(7, 3);
        assert_eq!(id.to_string(), "7_3");
        assert_eq!("7_3".parse::<PieceId>(), Ok(id));
    }

    #[test]
    fn piece_id_rejects_garbage() {
        assert!("7-3".parse::<PieceId>().is_err());
        assert!("_3".parse::<PieceId>().is_err());
        assert!("a_b".parse::<PieceId>().is_err());
    }

    #[test]
    fn piece_ids_sort_row_major() {
        let mut ids = vec![PieceId::new(1, 1), PieceId::new(2, 0), PieceId::new(0, 1)];
        ids.sort();
        assert_eq!(
            ids,
            vec![PieceId::new(2, 0), PieceId::new(0, 1), PieceId::new(1, 1)]
        );
    }

    #[test]
    fn client_id_displays_as_hex() {
        assert_eq!(ClientId::new(0xAB).to_string(), "00000000000000ab");
    }
}
