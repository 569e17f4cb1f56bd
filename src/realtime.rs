//! Real-time command classification and dispatch.
//!
//! Every received byte is offered to two independently replaceable stages
//! before it may be queued:
//!
//! ```text
//! byte ──▶ classifier ──yes──▶ handler ──consumed──▶ (gone)
//!              │                  │
//!              no             not consumed
//!              └───────┬──────────┘
//!                      ▼
//!                  RxBuffer
//! ```
//!
//! The classifier decides whether dispatch is attempted at all, the handler
//! performs it. Both are plain function pointers held in [`AtomicFn`], so
//! interrupt context always sees a complete old or new strategy.

use core::marker::PhantomData;
use core::sync::atomic::{AtomicPtr, AtomicU32, Ordering};

use bitflags::bitflags;

/// Decides whether a received byte is a real-time command candidate.
pub type Classifier = fn(u8) -> bool;

/// Consumes a real-time byte. Returns `false` to let it fall through to the
/// receive buffer.
pub type RealtimeHandler = fn(u8) -> bool;

/// Cooperative "may I keep waiting?" callback for blocking writes.
pub type BlockingCallback = fn() -> bool;

const ASCII_LF: u8 = 0x0A;
const ASCII_CR: u8 = 0x0D;
const ASCII_SPACE: u8 = 0x20;
const ASCII_DEL: u8 = 0x7F;

/// Function pointer types that fit in a single atomic word.
///
/// # Safety
///
/// `from_raw(into_raw(f))` must return `f`.
pub unsafe trait FnPtr: Copy + 'static {
    /// Erase to a thin pointer.
    fn into_raw(self) -> *mut ();

    /// Restore from a pointer produced by [`FnPtr::into_raw`].
    ///
    /// # Safety
    ///
    /// `raw` must come from `into_raw` of the same type.
    unsafe fn from_raw(raw: *mut ()) -> Self;
}

// SAFETY: fn pointers are one word and round-trip through `*mut ()`.
unsafe impl FnPtr for fn(u8) -> bool {
    #[inline]
    fn into_raw(self) -> *mut () {
        self as *mut ()
    }

    #[inline]
    unsafe fn from_raw(raw: *mut ()) -> Self {
        unsafe { core::mem::transmute::<*mut (), fn(u8) -> bool>(raw) }
    }
}

// SAFETY: as above.
unsafe impl FnPtr for fn() -> bool {
    #[inline]
    fn into_raw(self) -> *mut () {
        self as *mut ()
    }

    #[inline]
    unsafe fn from_raw(raw: *mut ()) -> Self {
        unsafe { core::mem::transmute::<*mut (), fn() -> bool>(raw) }
    }
}

/// Lock-free slot holding a swappable function pointer.
pub struct AtomicFn<F: FnPtr> {
    ptr: AtomicPtr<()>,
    _marker: PhantomData<F>,
}

impl<F: FnPtr> AtomicFn<F> {
    /// Create a slot holding `f`.
    pub fn new(f: F) -> Self {
        Self {
            ptr: AtomicPtr::new(f.into_raw()),
            _marker: PhantomData,
        }
    }

    /// Current function.
    #[inline]
    pub fn load(&self) -> F {
        // SAFETY: only ever stores values produced by `F::into_raw`
        unsafe { F::from_raw(self.ptr.load(Ordering::Acquire)) }
    }

    /// Install `f`, returning the previous function.
    #[inline]
    pub fn swap(&self, f: F) -> F {
        let prev = self.ptr.swap(f.into_raw(), Ordering::AcqRel);
        // SAFETY: only ever stores values produced by `F::into_raw`
        unsafe { F::from_raw(prev) }
    }

    /// Install `f`.
    #[inline]
    pub fn store(&self, f: F) {
        self.ptr.store(f.into_raw(), Ordering::Release);
    }
}

/// Default classifier.
///
/// Diverts control characters except CR and LF, the question mark, and
/// DEL plus the whole top-bit-set range.
#[inline]
pub fn is_realtime(c: u8) -> bool {
    (c < ASCII_SPACE && !(c == ASCII_CR || c == ASCII_LF)) || c == b'?' || c >= ASCII_DEL
}

/// Default classifier plus the printable `~` (cycle start) and `!` (feed hold).
#[inline]
pub fn is_realtime_legacy(c: u8) -> bool {
    is_realtime(c) || c == b'~' || c == b'!'
}

/// Diverts nothing. For links carrying raw binary payload.
#[inline]
pub fn never_realtime(_c: u8) -> bool {
    false
}

/// Handler installed while flash is erased or programmed.
///
/// Consumes every byte the default classifier would divert, without
/// touching the controller state the normal handler updates.
pub fn filter_realtime(c: u8) -> bool {
    is_realtime(c)
}

/// Blocking callback that never gives up.
#[inline]
pub fn keep_waiting() -> bool {
    true
}

/// Real-time commands the controller reacts to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RealtimeCommand {
    /// Soft reset (CAN).
    Reset,
    /// Stop motion and abort the current job.
    Stop,
    /// Status report request.
    StatusReport,
    /// Cycle start / resume.
    CycleStart,
    /// Feed hold.
    FeedHold,
    /// Safety door opened.
    SafetyDoor,
    /// Cancel the active jog.
    JogCancel,
}

impl RealtimeCommand {
    /// Decode a received byte.
    pub fn from_byte(c: u8) -> Option<Self> {
        match c {
            0x18 => Some(Self::Reset),
            0x19 => Some(Self::Stop),
            b'?' | 0x80 => Some(Self::StatusReport),
            b'~' | 0x81 => Some(Self::CycleStart),
            b'!' | 0x82 => Some(Self::FeedHold),
            0x84 => Some(Self::SafetyDoor),
            0x85 => Some(Self::JogCancel),
            _ => None,
        }
    }

    /// Pending-flag bit for this command.
    pub fn flag(self) -> ExecFlags {
        match self {
            Self::Reset => ExecFlags::RESET,
            Self::Stop => ExecFlags::STOP,
            Self::StatusReport => ExecFlags::STATUS_REPORT,
            Self::CycleStart => ExecFlags::CYCLE_START,
            Self::FeedHold => ExecFlags::FEED_HOLD,
            Self::SafetyDoor => ExecFlags::SAFETY_DOOR,
            Self::JogCancel => ExecFlags::JOG_CANCEL,
        }
    }
}

bitflags! {
    /// Real-time commands latched and not yet serviced.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ExecFlags: u32 {
        const RESET = 1 << 0;
        const STOP = 1 << 1;
        const STATUS_REPORT = 1 << 2;
        const CYCLE_START = 1 << 3;
        const FEED_HOLD = 1 << 4;
        const SAFETY_DOOR = 1 << 5;
        const JOG_CANCEL = 1 << 6;
    }
}

/// Latch between interrupt-context dispatch and the foreground protocol loop.
pub struct RealtimeState {
    pending: AtomicU32,
    discarded: AtomicU32,
}

impl RealtimeState {
    /// Create an empty latch.
    pub const fn new() -> Self {
        Self {
            pending: AtomicU32::new(0),
            discarded: AtomicU32::new(0),
        }
    }

    /// Latch a command (ISR-safe).
    #[inline]
    pub fn latch(&self, cmd: RealtimeCommand) {
        self.pending.fetch_or(cmd.flag().bits(), Ordering::AcqRel);
    }

    /// Count a diverted byte that decodes to no command.
    #[inline]
    pub fn note_discarded(&self) {
        self.discarded.fetch_add(1, Ordering::Relaxed);
    }

    /// Take and clear all pending commands.
    #[inline]
    pub fn take(&self) -> ExecFlags {
        ExecFlags::from_bits_truncate(self.pending.swap(0, Ordering::AcqRel))
    }

    /// Pending commands without clearing them.
    #[inline]
    pub fn peek(&self) -> ExecFlags {
        ExecFlags::from_bits_truncate(self.pending.load(Ordering::Acquire))
    }

    /// Diverted bytes that decoded to no command.
    #[inline]
    pub fn discarded(&self) -> u32 {
        self.discarded.load(Ordering::Relaxed)
    }
}

impl Default for RealtimeState {
    fn default() -> Self {
        Self::new()
    }
}

/// Controller-wide real-time command latch.
pub static REALTIME: RealtimeState = RealtimeState::new();

/// Default process-wide real-time sink.
///
/// Latches known commands into [`REALTIME`] and discards the rest; every
/// byte offered is consumed.
pub fn enqueue_realtime_command(c: u8) -> bool {
    match RealtimeCommand::from_byte(c) {
        Some(cmd) => REALTIME.latch(cmd),
        None => REALTIME.note_discarded(),
    }
    true
}

/// Anything whose real-time handler can be swapped.
pub trait RealtimeRedirect {
    /// Install `handler`, returning the one it replaces.
    fn set_realtime_handler(&self, handler: RealtimeHandler) -> RealtimeHandler;
}

/// Scoped handler replacement, restored on drop.
///
/// ```ignore
/// {
///     let _guard = HandlerOverride::install(&stream, filter_realtime);
///     // flash erase + program
/// } // previous handler back in place
/// ```
pub struct HandlerOverride<'a> {
    target: &'a dyn RealtimeRedirect,
    previous: RealtimeHandler,
}

impl<'a> HandlerOverride<'a> {
    /// Install `handler` on `target` until the guard is dropped.
    pub fn install(target: &'a dyn RealtimeRedirect, handler: RealtimeHandler) -> Self {
        let previous = target.set_realtime_handler(handler);
        Self { target, previous }
    }
}

impl Drop for HandlerOverride<'_> {
    fn drop(&mut self) {
        self.target.set_realtime_handler(self.previous);
    }
}
