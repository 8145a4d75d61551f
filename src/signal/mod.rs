//! Signal numbering, dispositions, frame construction, and the delivery
//! state machine.

mod deliver;
mod frame;
mod types;

pub use frame::SignalFrame;
pub use types::{
    default_action, is_valid_signal, AltStack, AltStackFlags, DefaultAction, MaskHow,
    QueuedSignal, SigActionFlags, SigInfo, SigSet, SignalDisposition, SignalHandler, Signo,
    SIGABRT, SIGALRM, SIGBUS, SIGCHLD, SIGCONT, SIGFPE, SIGHUP, SIGILL, SIGINT, SIGIO, SIGKILL,
    SIGPIPE, SIGPROF, SIGPWR, SIGQUIT, SIGSEGV, SIGSTKFLT, SIGSTOP, SIGSYS, SIGTERM, SIGTRAP,
    SIGTSTP, SIGTTIN, SIGTTOU, SIGURG, SIGUSR1, SIGUSR2, SIGVTALRM, SIGWINCH, SIGXCPU, SIGXFSZ,
};
