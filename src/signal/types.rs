//! Signal numbering, masks, dispositions, and the default-action table.

use bitflags::bitflags;

use crate::config::NSIG;
use crate::error::{KernelError, KernelResult};

/// Signal number; valid values are `1..NSIG`.
pub type Signo = u8;

pub const SIGHUP: Signo = 1;
pub const SIGINT: Signo = 2;
pub const SIGQUIT: Signo = 3;
pub const SIGILL: Signo = 4;
pub const SIGTRAP: Signo = 5;
pub const SIGABRT: Signo = 6;
pub const SIGBUS: Signo = 7;
pub const SIGFPE: Signo = 8;
pub const SIGKILL: Signo = 9;
pub const SIGUSR1: Signo = 10;
pub const SIGSEGV: Signo = 11;
pub const SIGUSR2: Signo = 12;
pub const SIGPIPE: Signo = 13;
pub const SIGALRM: Signo = 14;
pub const SIGTERM: Signo = 15;
pub const SIGSTKFLT: Signo = 16;
pub const SIGCHLD: Signo = 17;
pub const SIGCONT: Signo = 18;
pub const SIGSTOP: Signo = 19;
pub const SIGTSTP: Signo = 20;
pub const SIGTTIN: Signo = 21;
pub const SIGTTOU: Signo = 22;
pub const SIGURG: Signo = 23;
pub const SIGXCPU: Signo = 24;
pub const SIGXFSZ: Signo = 25;
pub const SIGVTALRM: Signo = 26;
pub const SIGPROF: Signo = 27;
pub const SIGWINCH: Signo = 28;
pub const SIGIO: Signo = 29;
pub const SIGPWR: Signo = 30;
pub const SIGSYS: Signo = 31;

/// True for signal numbers inside `1..NSIG`.
pub const fn is_valid_signal(signo: Signo) -> bool {
    signo >= 1 && signo < NSIG
}

/// Set of signal numbers; bit `N - 1` represents signal `N`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SigSet(u32);

impl SigSet {
    /// Signals that can be neither blocked nor given a disposition.
    pub const UNMASKABLE: SigSet =
        SigSet((1 << (SIGKILL as u32 - 1)) | (1 << (SIGSTOP as u32 - 1)));

    /// The empty set.
    pub const fn empty() -> SigSet {
        SigSet(0)
    }

    /// Set containing exactly `signo`.
    pub const fn single(signo: Signo) -> SigSet {
        SigSet(1 << (signo as u32 - 1))
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, signo: Signo) -> bool {
        self.0 & SigSet::single(signo).0 != 0
    }

    pub fn add(&mut self, signo: Signo) {
        self.0 |= SigSet::single(signo).0;
    }

    pub fn remove(&mut self, signo: Signo) {
        self.0 &= !SigSet::single(signo).0;
    }

    pub const fn union(self, other: SigSet) -> SigSet {
        SigSet(self.0 | other.0)
    }

    pub const fn subtract(self, other: SigSet) -> SigSet {
        SigSet(self.0 & !other.0)
    }

    /// Drops the bits of [`SigSet::UNMASKABLE`]; every mask update goes
    /// through this so `SIGKILL`/`SIGSTOP` never become blockable.
    pub const fn without_unmaskable(self) -> SigSet {
        self.subtract(SigSet::UNMASKABLE)
    }

    /// Lowest-numbered signal in the set, if any.
    ///
    /// Delivery order is defined as ascending numeric order, so this is the
    /// only scan the core ever performs on a pending set.
    pub fn first_set(self) -> Option<Signo> {
        if self.0 == 0 {
            return None;
        }
        Some(self.0.trailing_zeros() as Signo + 1)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn from_bits(bits: u32) -> SigSet {
        SigSet(bits)
    }
}

bitflags! {
    /// Behavior flags of an installed signal handler.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct SigActionFlags: u32 {
        /// Handler takes the extended `(signo, &siginfo, &context)` form.
        const SIGINFO = 0x0000_0004;
        /// Run the handler on the process's alternate signal stack.
        const ONSTACK = 0x0800_0000;
        /// Transparently restart an interrupted restartable system call.
        const RESTART = 0x1000_0000;
        /// Do not mask the delivered signal while its handler runs.
        const NODEFER = 0x4000_0000;
        /// Reset the disposition to default after one delivery.
        const RESETHAND = 0x8000_0000;
        /// `restorer` field of the disposition is valid.
        const RESTORER = 0x0400_0000;
    }
}

/// Where delivery of one signal number routes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SignalHandler {
    /// Apply the default action from [`default_action`].
    #[default]
    Default,
    /// Discard the signal.
    Ignore,
    /// Redirect the task into the user handler at this entry address.
    Handler(u64),
}

/// Per-signal disposition as installed by a process.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SignalDisposition {
    pub handler: SignalHandler,
    pub flags: SigActionFlags,
    /// Additional signals masked while the handler runs.
    pub mask: SigSet,
    /// Entry address of the signal-return trampoline the handler returns
    /// into; meaningful when [`SigActionFlags::RESTORER`] is set.
    pub restorer: u64,
}

/// How `set_signal_mask` combines the supplied set with the current mask.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MaskHow {
    /// Union the set into the mask.
    Block,
    /// Remove the set from the mask.
    Unblock,
    /// Replace the mask with the set.
    Set,
}

/// Default action applied when a signal has no handler and is not ignored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DefaultAction {
    Terminate,
    TerminateAndDump,
    Ignore,
    Stop,
    Continue,
    /// Row for numbers outside `1..NSIG`; never produced for valid input.
    Invalid,
}

/// Default-action table lookup.
///
/// Calling this with a number outside `1..NSIG` is a programming error and
/// halts the kernel.
pub fn default_action(signo: Signo) -> DefaultAction {
    assert!(
        is_valid_signal(signo),
        "default action lookup for invalid signal {}",
        signo
    );
    match signo {
        SIGHUP | SIGINT | SIGKILL | SIGUSR1 | SIGUSR2 | SIGPIPE | SIGALRM | SIGTERM
        | SIGSTKFLT | SIGVTALRM | SIGPROF | SIGIO | SIGPWR => DefaultAction::Terminate,
        SIGQUIT | SIGILL | SIGTRAP | SIGABRT | SIGBUS | SIGFPE | SIGSEGV | SIGXCPU
        | SIGXFSZ | SIGSYS => DefaultAction::TerminateAndDump,
        SIGCHLD | SIGURG | SIGWINCH => DefaultAction::Ignore,
        SIGSTOP | SIGTSTP | SIGTTIN | SIGTTOU => DefaultAction::Stop,
        SIGCONT => DefaultAction::Continue,
        _ => DefaultAction::Invalid,
    }
}

/// Payload delivered alongside a signal to `SIGINFO` handlers.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SigInfo {
    pub signo: u64,
    /// Origin of the signal; one of the `CODE_*` values.
    pub code: u64,
    pub sender_pid: u64,
    /// Sender-supplied value for queued sends, zero otherwise.
    pub value: u64,
}

impl SigInfo {
    /// `code` of a payload synthesized for a plain (un-queued) send.
    pub const CODE_KILL: u64 = 0;

    /// `code` of a payload carried by a queued send.
    pub const CODE_QUEUED: u64 = 1;

    /// Minimal payload for a signal sent without a queued entry.
    pub fn for_kill(signo: Signo, sender_pid: u32) -> SigInfo {
        SigInfo {
            signo: signo as u64,
            code: SigInfo::CODE_KILL,
            sender_pid: sender_pid as u64,
            value: 0,
        }
    }
}

/// One queued-payload signal entry on a task's FIFO.
///
/// Entries of the same number are delivered in send order; ordering across
/// numbers is still ascending-numeric, decided by the pending bitset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueuedSignal {
    pub signo: Signo,
    pub info: SigInfo,
}

bitflags! {
    /// State bits of an alternate signal stack descriptor.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct AltStackFlags: u32 {
        /// A handler is currently executing on this stack.
        const ONSTACK = 0x1;
        /// The alternate stack is disabled.
        const DISABLE = 0x2;
    }
}

/// Alternate signal stack installed by a process for `ONSTACK` handlers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AltStack {
    /// Lowest address of the stack area.
    pub base: u64,
    /// Area length in bytes.
    pub size: u64,
    pub flags: AltStackFlags,
}

impl AltStack {
    /// The disabled descriptor processes start with.
    pub const fn disabled() -> AltStack {
        AltStack {
            base: 0,
            size: 0,
            flags: AltStackFlags::DISABLE,
        }
    }

    /// Validates a descriptor supplied by `set_alt_signal_stack`.
    pub fn validate(&self) -> KernelResult<()> {
        if self.flags.contains(AltStackFlags::DISABLE) {
            return Ok(());
        }
        if self.size < crate::config::MIN_ALT_STACK_SIZE {
            return Err(KernelError::InvalidStack);
        }
        Ok(())
    }

    /// True when handlers may be redirected onto this stack.
    pub fn enabled(&self) -> bool {
        !self.flags.contains(AltStackFlags::DISABLE) && self.size != 0
    }

    /// One-past-the-end address; handler frames start here.
    pub fn top(&self) -> u64 {
        self.base + self.size
    }

    /// True when `sp` already points into the stack area.
    pub fn contains(&self, sp: u64) -> bool {
        sp >= self.base && sp < self.top()
    }
}
