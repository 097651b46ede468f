use std::cell::UnsafeCell;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

/// ロック獲得待ちの際に、`thread::yield_now()`に切り替えるまでにスピンする回数.
const MAX_SPINS_BEFORE_YIELD: u32 = 64;

/// 到着順(FIFO)での排他制御を保証するスピンロック.
///
/// 内部的には「発券済みのチケット番号」と「現在処理中のチケット番号」の二つのカウンタのみを保持しており、
/// ロック獲得者は、自分のチケット番号が呼ばれるまでビジーウェイトを行う.
///
/// 二つのカウンタが等しい状態が"非競合(UNCONTESTED)"、
/// 発券済みの方が大きい状態が"競合(CONTESTED)"に相当する.
/// 待ち行列の長さに制限はなく、ロックが解放される度に、待機者のうち最も古い一つだけが先に進む.
///
/// # 注意
///
/// - 再帰的なロック獲得はサポートしておらず、同一スレッドから二重に`lock`を呼び出すとデッドロックする
/// - ビジーウェイトを行うため、長時間ロックを保持し続ける用途(e.g., I/O処理中の保護)には向かない
/// - 一定回数スピンしても順番が回ってこない場合には`thread::yield_now()`を挟むが、
///   FIFO順が保証される都合上、次の順番のスレッドがプリエンプトされると後続の待機者は全てそれを待つことになる
pub struct TicketMutex<T: ?Sized> {
    ticket: AtomicUsize,
    serving: AtomicUsize,
    value: UnsafeCell<T>,
}
unsafe impl<T: ?Sized + Send> Send for TicketMutex<T> {}
unsafe impl<T: ?Sized + Send> Sync for TicketMutex<T> {}
impl<T> TicketMutex<T> {
    /// ロックされていない状態の`TicketMutex`インスタンスを生成する.
    pub const fn new(value: T) -> Self {
        TicketMutex {
            ticket: AtomicUsize::new(0),
            serving: AtomicUsize::new(0),
            value: UnsafeCell::new(value),
        }
    }

    /// 保護対象の値を取り出す.
    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }
}
impl<T: ?Sized> TicketMutex<T> {
    /// ロックを獲得する.
    ///
    /// 自分の順番が回ってくるまで、呼び出し元のスレッドはスピンし続ける.
    /// ロックは、返り値のガードが破棄された時点で解放される.
    pub fn lock(&self) -> TicketMutexGuard<'_, T> {
        let ticket = self.ticket.fetch_add(1, Ordering::Relaxed);
        let mut spins = 0;
        while self.serving.load(Ordering::Acquire) != ticket {
            if spins < MAX_SPINS_BEFORE_YIELD {
                std::hint::spin_loop();
                spins += 1;
            } else {
                // 順番が回ってくるべきスレッドがプリエンプトされている可能性があるので、CPUを明け渡す
                thread::yield_now();
            }
        }
        TicketMutexGuard { mutex: self }
    }

    /// 待機者がいない場合に限り、ロックを獲得する.
    ///
    /// 既に誰かがロックを保持している(ないし待機している)場合には`None`が返される.
    /// この場合、チケットは消費されない.
    pub fn try_lock(&self) -> Option<TicketMutexGuard<'_, T>> {
        let serving = self.serving.load(Ordering::Acquire);
        self.ticket
            .compare_exchange(
                serving,
                serving.wrapping_add(1),
                Ordering::Acquire,
                Ordering::Relaxed,
            )
            .ok()
            .map(|_| TicketMutexGuard { mutex: self })
    }

    /// ロックが保持されている(ないし待機者がいる)かどうかを判定する.
    ///
    /// 返り値は呼び出し時点のスナップショットに過ぎない点に注意.
    pub fn is_contested(&self) -> bool {
        self.queue_len() != 0
    }

    /// ロックの保持者と待機者の合計数を返す.
    pub fn queue_len(&self) -> usize {
        // NOTE: 以下の順番で値を取得しないとアンダーフローする可能性がある
        let serving = self.serving.load(Ordering::Acquire);
        let ticket = self.ticket.load(Ordering::Acquire);
        ticket.wrapping_sub(serving)
    }

    /// 保護対象の値への可変参照を返す.
    ///
    /// `&mut self`を要求するので、ロックを獲得する必要はない.
    pub fn get_mut(&mut self) -> &mut T {
        unsafe { &mut *self.value.get() }
    }

    fn unlock(&self) {
        self.serving.fetch_add(1, Ordering::Release);
    }
}
impl<T: Default> Default for TicketMutex<T> {
    fn default() -> Self {
        TicketMutex::new(T::default())
    }
}
impl<T: ?Sized + fmt::Debug> fmt::Debug for TicketMutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.try_lock() {
            Some(guard) => f
                .debug_struct("TicketMutex")
                .field("value", &&*guard)
                .finish(),
            None => f
                .debug_struct("TicketMutex")
                .field("value", &format_args!("<locked>"))
                .finish(),
        }
    }
}

/// `TicketMutex`のロックガード.
///
/// このガードが破棄されると、待機者のうち最も古い一つにロックが引き渡される.
pub struct TicketMutexGuard<'a, T: ?Sized + 'a> {
    mutex: &'a TicketMutex<T>,
}
impl<'a, T: ?Sized> Deref for TicketMutexGuard<'a, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.mutex.value.get() }
    }
}
impl<'a, T: ?Sized> DerefMut for TicketMutexGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.mutex.value.get() }
    }
}
impl<'a, T: ?Sized> Drop for TicketMutexGuard<'a, T> {
    fn drop(&mut self) {
        self.mutex.unlock();
    }
}
impl<'a, T: ?Sized + fmt::Debug> fmt::Debug for TicketMutexGuard<'a, T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}
