//! Partition Block.
use crate::alignment::Alignment;
use crate::hunk::Piece;

/// partitionが保持するブロック群の中での位置.
pub(crate) type BlockIndex = usize;

/// partitionの領域を構成する固定長のブロック.
///
/// hunkから切り出されたデータ領域(`piece`)と、その中の割当済み領域の終端を示すマーカーを保持する.
/// `[0, marker)`が割当済み、`[marker, piece.len)`が未割当の領域となる.
///
/// ブロックは、一つ前(古い方)のブロックへの後方リンクのみを持つ.
/// 生成後に変化するのはマーカーのみである.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Block {
    piece: Piece,
    marker: usize,
    prev: Option<BlockIndex>,
}
impl Block {
    pub fn new(piece: Piece, prev: Option<BlockIndex>) -> Self {
        Block {
            piece,
            marker: 0,
            prev,
        }
    }

    pub fn piece(&self) -> Piece {
        self.piece
    }

    pub fn marker(&self) -> usize {
        self.marker
    }

    pub fn prev(&self) -> Option<BlockIndex> {
        self.prev
    }

    /// 割当済みの領域を返す.
    pub fn used(&self) -> Piece {
        self.piece.head(self.marker)
    }

    /// `size`バイトの割当が、このブロックに収まるかどうかを判定する.
    ///
    /// 収まる場合には、割当の開始位置(ブロック先頭からのオフセット)が返される.
    ///
    /// 開始位置は、hunk内の絶対位置が`alignment`の境界に揃うように調整される.
    /// 判定は「`size`が残り容量より真に小さいか」で行うので、
    /// 残り容量とちょうど等しいサイズの割当は収まらないものとして扱われる.
    pub fn fit(&self, size: usize, alignment: Alignment) -> Option<usize> {
        let offset = alignment.ceil_align(self.piece.start + self.marker) - self.piece.start;
        if offset <= self.piece.len && size < self.piece.len - offset {
            Some(offset)
        } else {
            None
        }
    }

    /// `offset`位置から`size`バイトを割り当てて、マーカーを進める.
    pub fn bump(&mut self, offset: usize, size: usize) -> Piece {
        debug_assert!(self.marker <= offset);
        debug_assert!(offset + size <= self.piece.len);
        self.marker = offset + size;
        Piece {
            start: self.piece.start + offset,
            len: size,
        }
    }

    pub fn reset(&mut self) {
        self.marker = 0;
    }
}

/// ブロックの状態のスナップショット.
///
/// [`Partition::blocks`]で取得できる.
///
/// [`Partition::blocks`]: ./struct.Partition.html#method.blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    /// ブロックのデータ領域.
    pub piece: Piece,

    /// データ領域のうち、割当済みのバイト数.
    pub marker: usize,
}
impl BlockInfo {
    /// ブロックの未割当のバイト数を返す.
    pub fn remaining(&self) -> usize {
        self.piece.len - self.marker
    }
}
impl<'a> From<&'a Block> for BlockInfo {
    fn from(f: &'a Block) -> Self {
        BlockInfo {
            piece: f.piece,
            marker: f.marker,
        }
    }
}

/// ブロック群を、新しいものから古いものへと後方リンクに沿って辿るイテレータ.
#[derive(Debug)]
pub(crate) struct Chain<'a> {
    blocks: &'a [Block],
    next: Option<BlockIndex>,
}
impl<'a> Chain<'a> {
    pub fn new(blocks: &'a [Block], head: Option<BlockIndex>) -> Self {
        Chain { blocks, next: head }
    }
}
impl<'a> Iterator for Chain<'a> {
    type Item = (BlockIndex, &'a Block);
    fn next(&mut self) -> Option<Self::Item> {
        let index = self.next?;
        let block = &self.blocks[index];
        self.next = block.prev;
        Some((index, block))
    }
}
