//! Piece.

/// hunk内の部分領域を示すための構造体.
///
/// 位置はhunkの先頭からのオフセット(バイト単位)で表現される.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Piece {
    /// 部分領域の開始位置（バイト単位）
    pub start: usize,

    /// 部分領域の長さ（バイト単位）
    pub len: usize,
}
impl Piece {
    /// 部分領域の終端位置を返す.
    ///
    /// **注意**: Pieceは [start, end) の領域を用いるため、end位置自体は含まれない.
    pub fn end(&self) -> usize {
        self.start + self.len
    }

    /// 長さが`0`かどうかを判定する.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// `other`と領域が重なっているかどうかを判定する.
    ///
    /// 長さ`0`の部分領域は、いずれの部分領域とも重ならない.
    pub fn overlaps(&self, other: &Piece) -> bool {
        !self.is_empty() && !other.is_empty() && self.start < other.end() && other.start < self.end()
    }

    /// 先頭から`len`バイトの部分領域を返す.
    pub(crate) fn head(&self, len: usize) -> Piece {
        debug_assert!(len <= self.len);
        Piece {
            start: self.start,
            len,
        }
    }
}
