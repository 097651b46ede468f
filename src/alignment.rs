//! hunkやpartition内の位置およびサイズのアライメント関連の構成要素.
use crate::{ErrorKind, Result};

/// 位置やサイズを揃えるための境界(2の冪)を表現する構造体.
///
/// 指定された境界にアライメントを行うための補助メソッド群も提供している.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Alignment(usize);
impl Alignment {
    /// バイト境界(i.e., アライメントなし).
    pub const BYTE: Alignment = Alignment(1);

    /// 4バイト境界.
    ///
    /// ブロックの成長時のサイズ計算や、最小ブロックサイズのデフォルト値の計算に使われる.
    pub const WORD: Alignment = Alignment(4);

    /// 16バイト境界.
    ///
    /// hunkから切り出される全ての領域の開始位置は、この境界に揃えられる.
    /// そのため、これ以下のアライメントを要求する型は、任意のブロックの先頭に配置可能.
    pub const BLOCK: Alignment = Alignment(16);

    /// 指定された値のアライメントを表現する`Alignment`インスタンスを生成する.
    ///
    /// # Errors
    ///
    /// `alignment`が2の冪ではない場合には、種類が`ErrorKind::InvalidInput`のエラーが返される.
    ///
    /// # Examples
    ///
    /// ```
    /// use hunkarena::ErrorKind;
    /// use hunkarena::alignment::Alignment;
    ///
    /// assert_eq!(Alignment::new(8).ok().map(|a| a.as_usize()), Some(8));
    /// assert_eq!(Alignment::new(1).ok(), Some(Alignment::BYTE));
    ///
    /// assert_eq!(Alignment::new(0).err().map(|e| *e.kind()), Some(ErrorKind::InvalidInput));
    /// assert_eq!(Alignment::new(12).err().map(|e| *e.kind()), Some(ErrorKind::InvalidInput));
    /// ```
    #[allow(clippy::new_ret_no_self)]
    pub fn new(alignment: usize) -> Result<Self> {
        track_assert!(
            alignment.is_power_of_two(),
            ErrorKind::InvalidInput,
            "Not a power of two: {}",
            alignment
        );
        Ok(Alignment(alignment))
    }

    /// 型`T`が要求するアライメントを返す.
    pub fn of<T>() -> Self {
        Alignment(std::mem::align_of::<T>())
    }

    /// 指定位置より後方の最初の境界位置を返す.
    ///
    /// # Examples
    ///
    /// ```
    /// use hunkarena::alignment::Alignment;
    ///
    /// assert_eq!(Alignment::WORD.ceil_align(0), 0);
    /// assert_eq!(Alignment::WORD.ceil_align(1), 4);
    /// assert_eq!(Alignment::WORD.ceil_align(4), 4);
    /// assert_eq!(Alignment::WORD.ceil_align(13), 16);
    /// ```
    pub fn ceil_align(self, position: usize) -> usize {
        (position + self.0 - 1) & !(self.0 - 1)
    }

    /// `ceil_align`のオーバーフロー検査付き版.
    pub fn checked_ceil_align(self, position: usize) -> Option<usize> {
        position
            .checked_add(self.0 - 1)
            .map(|p| p & !(self.0 - 1))
    }

    /// 指定位置より前方の最初の境界位置を返す.
    ///
    /// # Examples
    ///
    /// ```
    /// use hunkarena::alignment::Alignment;
    ///
    /// assert_eq!(Alignment::BLOCK.floor_align(0), 0);
    /// assert_eq!(Alignment::BLOCK.floor_align(15), 0);
    /// assert_eq!(Alignment::BLOCK.floor_align(33), 32);
    /// ```
    pub fn floor_align(self, position: usize) -> usize {
        position & !(self.0 - 1)
    }

    /// 指定位置が境界に沿っているかどうかを判定する.
    ///
    /// # Examples
    ///
    /// ```
    /// use hunkarena::alignment::Alignment;
    ///
    /// assert!(Alignment::WORD.is_aligned(0));
    /// assert!(Alignment::WORD.is_aligned(8));
    /// assert!(!Alignment::WORD.is_aligned(6));
    /// ```
    pub fn is_aligned(self, position: usize) -> bool {
        position & (self.0 - 1) == 0
    }

    /// このアライメントが`other`を包含しているかを確認する.
    ///
    /// "包含している"とは「`self`の境界に揃った位置は、常に`other`の境界にも揃っている」ことを意味する.
    pub fn contains(self, other: Alignment) -> bool {
        self.0 >= other.0
    }

    /// アライメント値を`usize`に変換して返す.
    pub fn as_usize(self) -> usize {
        self.0
    }
}
impl Default for Alignment {
    fn default() -> Self {
        Alignment::BYTE
    }
}
