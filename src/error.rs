use std;
use trackable;
use trackable::error::ErrorKindExt;

/// crate固有のエラー型.
#[derive(Debug, Clone, TrackableError)]
pub struct Error(trackable::error::TrackableError<ErrorKind>);
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        if let Some(e) = e.get_ref().and_then(|e| e.downcast_ref::<Error>()).cloned() {
            e
        } else if e.kind() == std::io::ErrorKind::InvalidInput {
            ErrorKind::InvalidInput.cause(e).into()
        } else {
            ErrorKind::Other.cause(e).into()
        }
    }
}
impl From<Error> for std::io::Error {
    fn from(e: Error) -> Self {
        if *e.kind() == ErrorKind::InvalidInput {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, e)
        } else {
            std::io::Error::new(std::io::ErrorKind::Other, e)
        }
    }
}

/// 発生し得るエラーの種別.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// hunkに空き容量がない.
    ///
    /// hunkは後から拡張できないため、リトライしても成功することはない.
    ///
    /// # 典型的な対応策
    ///
    /// - 呼び出し側で、処理全体(ないしサブシステム)を致命的なエラーとして扱う
    /// - より大きなサイズのhunkを用いてプロセスを再起動する
    HunkFull,

    /// 入力が不正.
    ///
    /// 初期化済みのpartitionに対する再初期化等、リリースビルドでのみ検出される誤用も含む
    /// (デバッグビルドでは、その場でパニックする).
    ///
    /// # 典型的な対応策
    ///
    /// - 利用者側のプログラムを修正して入力を正しくする
    InvalidInput,

    /// その他エラー.
    ///
    /// E.g., OSがメモリ領域の確保を拒否した
    Other,
}
impl trackable::error::ErrorKind for ErrorKind {}
