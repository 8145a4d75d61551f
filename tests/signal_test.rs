//! The signal-delivery state machine: ordering, default actions, handler
//! dispatch, frame layout, and the restorer unwind.

mod common;

use common::{boot, spawn};
use vireo_kernel::arch::{FpuImage, USER_MODE_BITS};
use vireo_kernel::config::{
    FPU_IMAGE_SIZE, RED_ZONE_SIZE, STACK_ALIGNMENT, SYSCALL_INSN_LEN,
};
use vireo_kernel::error::Interrupted;
use vireo_kernel::platform::ChildEventKind;
use vireo_kernel::sched::KERNEL_PID;
use vireo_kernel::signal::{
    AltStack, AltStackFlags, MaskHow, SigActionFlags, SigInfo, SigSet, SignalDisposition,
    SignalHandler, SIGCONT, SIGHUP, SIGINT, SIGKILL, SIGQUIT, SIGSTOP, SIGTERM, SIGUSR1, SIGUSR2,
};
use vireo_kernel::task::TaskState;
use vireo_kernel::{BlockDescriptor, KernelError};

fn handler_disposition(entry: u64, flags: SigActionFlags, mask: SigSet) -> SignalDisposition {
    SignalDisposition {
        handler: SignalHandler::Handler(entry),
        flags: flags | SigActionFlags::RESTORER,
        mask,
        restorer: 0x6000,
    }
}

#[test]
fn test_signal_next_sig_is_lowest_unblocked() {
    let (mut platform, mut sched) = boot(1);
    let (pid, a) = spawn(&mut platform, &mut sched, 0x1000, 1);

    sched
        .set_signal_mask(a, MaskHow::Set, SigSet::single(SIGUSR1).union(SigSet::single(SIGTERM)))
        .expect("mask install must succeed");
    sched
        .signal_process(&mut platform, 0, pid, SIGTERM)
        .expect("send must succeed");
    sched
        .signal_process(&mut platform, 0, pid, SIGUSR1)
        .expect("send must succeed");

    assert_eq!(
        sched.task_get_next_sig(a),
        None,
        "masked signals must not be reported deliverable"
    );
    sched
        .set_signal_mask(a, MaskHow::Unblock, SigSet::single(SIGTERM))
        .expect("mask adjust must succeed");
    assert_eq!(sched.task_get_next_sig(a), Some(SIGTERM));
    sched
        .set_signal_mask(a, MaskHow::Unblock, SigSet::single(SIGUSR1))
        .expect("mask adjust must succeed");
    assert_eq!(
        sched.task_get_next_sig(a),
        Some(SIGUSR1),
        "delivery order must be ascending by signal number"
    );
}

#[test]
fn test_signal_default_terminate_before_running() {
    let (mut platform, mut sched) = boot(1);
    let (pid, a) = spawn(&mut platform, &mut sched, 1, 1);

    sched
        .signal_process(&mut platform, 0, pid, SIGUSR1)
        .expect("send must succeed");
    sched
        .signal_process(&mut platform, 0, pid, SIGTERM)
        .expect("send must succeed");

    let chosen = sched.run_next(&mut platform, 0);
    assert_eq!(
        chosen,
        sched.idle_task(0),
        "a task terminated during selection must not be resumed"
    );
    assert_eq!(sched.task_state(a), Some(TaskState::Exiting));

    let events = platform.events_for(0);
    assert_eq!(events.len(), 1, "termination must notify the parent exactly once");
    assert_eq!(
        events[0].kind,
        ChildEventKind::Interrupted(SIGUSR1),
        "the lowest-numbered signal must decide the exit reason"
    );
    assert_eq!(events[0].pid, pid);

    for _ in 0..3 {
        assert_ne!(
            sched.run_next(&mut platform, 0),
            a,
            "an exiting task must never be selected again"
        );
    }
}

#[test]
fn test_signal_fatal_on_exiting_is_idempotent() {
    let (mut platform, mut sched) = boot(1);
    let (pid, a) = spawn(&mut platform, &mut sched, 0x1000, 1);

    sched
        .signal_process(&mut platform, 0, pid, SIGTERM)
        .expect("send must succeed");
    sched.run_next(&mut platform, 0);
    assert_eq!(sched.task_state(a), Some(TaskState::Exiting));
    assert_eq!(platform.events_for(0).len(), 1);

    sched
        .task_do_sig(&mut platform, a, SIGKILL)
        .expect("send must succeed");
    assert_eq!(
        sched.task_state(a),
        Some(TaskState::Exiting),
        "a second fatal signal must leave the exiting task unchanged"
    );
    assert_eq!(
        platform.events_for(0).len(),
        1,
        "a second fatal signal must not notify the parent again"
    );
}

#[test]
fn test_signal_dump_action_requests_stack_trace() {
    let (mut platform, mut sched) = boot(1);
    let (pid, a) = spawn(&mut platform, &mut sched, 0x1000, 1);

    sched
        .signal_process(&mut platform, 0, pid, SIGQUIT)
        .expect("send must succeed");
    sched.run_next(&mut platform, 0);

    assert_eq!(
        platform.stack_traces,
        vec![a],
        "a dump-requesting fatal signal must emit a stack trace first"
    );
    assert_eq!(sched.task_state(a), Some(TaskState::Exiting));
    assert_eq!(platform.events_for(0)[0].kind, ChildEventKind::Interrupted(SIGQUIT));
}

#[test]
fn test_signal_stop_and_continue_group() {
    let (mut platform, mut sched) = boot(1);
    let (p1, t1) = spawn(&mut platform, &mut sched, 0x1000, 7);
    let (p2, t2) = spawn(&mut platform, &mut sched, 0x2000, 7);
    let (p3, t3) = spawn(&mut platform, &mut sched, 0x3000, 7);

    sched
        .signal_process_group(&mut platform, 0, 7, SIGSTOP)
        .expect("group send must succeed");
    assert_eq!(
        sched.run_next(&mut platform, 0),
        sched.idle_task(0),
        "stopping the whole group must leave only the idle task"
    );
    for tid in [t1, t2, t3] {
        assert_eq!(sched.task_state(tid), Some(TaskState::Stopped));
    }
    let stops: Vec<_> = platform
        .events_for(0)
        .iter()
        .map(|e| (e.pid, e.kind))
        .collect();
    assert_eq!(
        stops,
        vec![
            (p1, ChildEventKind::Stopped(SIGSTOP)),
            (p2, ChildEventKind::Stopped(SIGSTOP)),
            (p3, ChildEventKind::Stopped(SIGSTOP)),
        ],
        "each stopped process must notify the parent"
    );

    sched
        .signal_process_group(&mut platform, 0, 7, SIGCONT)
        .expect("group send must succeed");
    for tid in [t1, t2, t3] {
        assert_eq!(
            sched.task_state(tid),
            Some(TaskState::Ready),
            "a continue signal must resume a stopped task at send time"
        );
        assert_eq!(
            sched.pending_signals(tid),
            Some(SigSet::empty()),
            "a default-disposition continue must be consumed on resume"
        );
    }
    let continued = platform
        .events_for(0)
        .iter()
        .filter(|e| e.kind == ChildEventKind::Continued)
        .count();
    assert_eq!(continued, 3);
    assert_ne!(sched.run_next(&mut platform, 0), sched.idle_task(0));
}

#[test]
fn test_signal_kill_delivers_to_stopped_task() {
    let (mut platform, mut sched) = boot(1);
    let (pid, a) = spawn(&mut platform, &mut sched, 0x1000, 1);

    sched
        .signal_process(&mut platform, 0, pid, SIGSTOP)
        .expect("send must succeed");
    sched.run_next(&mut platform, 0);
    assert_eq!(sched.task_state(a), Some(TaskState::Stopped));

    // Ordinary signals stay pending on a stopped task.
    sched
        .signal_process(&mut platform, 0, pid, SIGTERM)
        .expect("send must succeed");
    assert_eq!(sched.task_state(a), Some(TaskState::Stopped));

    sched
        .signal_process(&mut platform, 0, pid, SIGKILL)
        .expect("send must succeed");
    assert_eq!(
        sched.task_state(a),
        Some(TaskState::Exiting),
        "SIGKILL must act on a stopped task at send time"
    );
}

#[test]
fn test_signal_self_dispatch_survives_reschedule() {
    let (mut platform, mut sched) = boot(1);
    let (pid, a) = spawn(&mut platform, &mut sched, 0x1000, 1);

    sched
        .set_signal_disposition(
            pid,
            SIGUSR1,
            handler_disposition(0x5000, SigActionFlags::empty(), SigSet::empty()),
        )
        .expect("handler install must succeed");
    assert_eq!(sched.run_next(&mut platform, 0), a);

    sched
        .signal_process(&mut platform, 0, pid, SIGUSR1)
        .expect("send must succeed");
    assert_eq!(
        sched.frame_depth(a),
        1,
        "a self-directed signal must dispatch before the send returns"
    );
    assert_eq!(sched.task_state(a), Some(TaskState::RunningInterruptible));

    assert_eq!(
        sched.run_next(&mut platform, 0),
        a,
        "rescheduling after a self-directed dispatch must reselect the task"
    );
    assert_eq!(sched.task_state(a), Some(TaskState::Running));
}

#[test]
fn test_signal_kernel_process_is_not_a_target() {
    let (mut platform, mut sched) = boot(1);
    let idle = sched.idle_task(0);

    assert_eq!(
        sched.signal_process(&mut platform, 0, KERNEL_PID, SIGTERM),
        Err(KernelError::NoSuchProcess),
        "the kernel process must not be a signal target"
    );
    assert_eq!(
        sched.queue_signal_process(&mut platform, 0, KERNEL_PID, SIGTERM, SigInfo::for_kill(SIGTERM, 0)),
        Err(KernelError::NoSuchProcess)
    );
    assert_eq!(
        sched.signal_task(&mut platform, 0, KERNEL_PID, idle, SIGTERM),
        Err(KernelError::NoSuchProcess)
    );
    assert_eq!(
        sched.task_do_sig(&mut platform, idle, SIGTERM),
        Err(KernelError::NoSuchProcess),
        "the idle task must not be a signal target"
    );

    assert_eq!(
        sched.run_next(&mut platform, 0),
        idle,
        "the idle fallback must stay runnable"
    );
    assert_eq!(sched.pending_signals(idle), Some(SigSet::empty()));
}

#[test]
fn test_signal_dispatch_without_frame_room_terminates() {
    let (mut platform, mut sched) = boot(1);
    let (pid, a) = spawn(&mut platform, &mut sched, 0x1000, 1);

    sched
        .set_signal_disposition(
            pid,
            SIGUSR1,
            handler_disposition(0x5000, SigActionFlags::empty(), SigSet::empty()),
        )
        .expect("handler install must succeed");

    // The interrupted stack pointer leaves no room below it for a frame.
    let mut ctx = sched.task_context(a).expect("task context must exist");
    ctx.stack_pointer = 64;
    sched.save_task_context(a, ctx);

    sched
        .task_do_sig(&mut platform, a, SIGUSR1)
        .expect("send must succeed");
    assert_eq!(
        sched.task_state(a),
        Some(TaskState::Exiting),
        "a task with no frame room must be terminated, not framed"
    );
    assert!(platform.placed_frames.is_empty());
    assert_eq!(sched.frame_depth(a), 0);
    assert_eq!(platform.events_for(0)[0].kind, ChildEventKind::Interrupted(SIGUSR1));
    assert_eq!(
        sched.run_next(&mut platform, 0),
        sched.idle_task(0),
        "the terminated task must never be selected"
    );
}

#[test]
fn test_signal_cont_resumes_despite_blocked_mask() {
    let (mut platform, mut sched) = boot(1);
    let (pid, a) = spawn(&mut platform, &mut sched, 0x1000, 1);

    sched
        .signal_process(&mut platform, 0, pid, SIGSTOP)
        .expect("send must succeed");
    sched.run_next(&mut platform, 0);
    assert_eq!(sched.task_state(a), Some(TaskState::Stopped));

    sched
        .set_signal_mask(a, MaskHow::Block, SigSet::single(SIGCONT))
        .expect("mask adjust must succeed");
    sched
        .signal_process(&mut platform, 0, pid, SIGCONT)
        .expect("send must succeed");
    assert_eq!(
        sched.task_state(a),
        Some(TaskState::Ready),
        "a blocked continue must still resume the stopped task"
    );
    assert!(platform
        .events_for(0)
        .iter()
        .any(|e| e.kind == ChildEventKind::Continued));
}

#[test]
fn test_signal_self_send_delivers_synchronously() {
    let (mut platform, mut sched) = boot(1);
    let (pid, a) = spawn(&mut platform, &mut sched, 0x1000, 1);

    assert_eq!(sched.run_next(&mut platform, 0), a);
    sched
        .signal_process(&mut platform, 0, pid, SIGTERM)
        .expect("send must succeed");
    assert_eq!(
        sched.task_state(a),
        Some(TaskState::Exiting),
        "a sender targeting itself must observe the effect before returning"
    );
}

#[test]
fn test_signal_handler_dispatch_frame_layout() {
    let (mut platform, mut sched) = boot(1);
    let (pid, a) = spawn(&mut platform, &mut sched, 0x1000, 1);

    sched
        .set_signal_disposition(
            pid,
            SIGUSR1,
            handler_disposition(0x5000, SigActionFlags::SIGINFO, SigSet::single(SIGHUP)),
        )
        .expect("handler install must succeed");

    let before = sched.task_context(a).expect("task context must exist");
    sched
        .task_do_sig(&mut platform, a, SIGUSR1)
        .expect("send must succeed");

    let (frame_task, frame) = platform
        .placed_frames
        .last()
        .cloned()
        .expect("dispatch must place a frame");
    assert_eq!(frame_task, a);
    assert_eq!(
        frame.base_sp, before.stack_pointer,
        "the frame must start at the interrupted stack pointer"
    );
    assert_eq!(
        frame.saved_context, before,
        "the frame must freeze the interrupted context verbatim"
    );
    assert!(
        frame.context_addr <= frame.base_sp - RED_ZONE_SIZE,
        "save areas must stay below the red zone"
    );
    assert!(frame.fpu_addr + FPU_IMAGE_SIZE as u64 <= frame.context_addr);
    assert!(frame.siginfo_addr < frame.fpu_addr);
    assert!(frame.trampoline_sp < frame.siginfo_addr);
    for addr in [frame.context_addr, frame.fpu_addr, frame.siginfo_addr, frame.trampoline_sp] {
        assert_eq!(addr % STACK_ALIGNMENT, 0, "every save area must be aligned");
    }
    assert_eq!(frame.return_address, 0x6000, "the handler must return into the restorer");
    assert_eq!(frame.mask_slot(), frame.trampoline_sp + 8);
    assert_eq!(
        frame.siginfo.expect("SIGINFO handlers must receive a payload"),
        SigInfo::for_kill(SIGUSR1, 0)
    );

    let after = sched.task_context(a).expect("task context must exist");
    assert_eq!(after.instruction_pointer, 0x5000, "the live context must enter the handler");
    assert_eq!(after.stack_pointer, frame.handler_sp());
    assert_eq!(after.mode_bits, USER_MODE_BITS);
    assert_eq!(
        after.args,
        [SIGUSR1 as u64, frame.siginfo_pointer(), frame.context_pointer()],
        "the handler must receive the conventional argument triple"
    );

    assert_eq!(
        sched.task_signal_mask(a),
        Some(SigSet::single(SIGHUP).union(SigSet::single(SIGUSR1))),
        "the handler mask must add the delivered signal unless NODEFER"
    );
    assert_eq!(sched.task_state(a), Some(TaskState::RunningInterruptible));
    assert_eq!(sched.frame_depth(a), 1);
}

#[test]
fn test_signal_return_restores_interrupted_state() {
    let (mut platform, mut sched) = boot(1);
    let (pid, a) = spawn(&mut platform, &mut sched, 0x1000, 1);

    sched
        .set_signal_disposition(
            pid,
            SIGUSR1,
            handler_disposition(0x5000, SigActionFlags::empty(), SigSet::empty()),
        )
        .expect("handler install must succeed");

    let fpu = FpuImage([0xAB; FPU_IMAGE_SIZE]);
    sched.save_task_fpu(a, fpu);
    let before_ctx = sched.task_context(a).expect("task context must exist");
    let before_mask = sched.task_signal_mask(a).expect("task mask must exist");

    sched
        .task_do_sig(&mut platform, a, SIGUSR1)
        .expect("send must succeed");
    assert_ne!(sched.task_context(a), Some(before_ctx));

    sched.signal_return(&mut platform, a);
    assert_eq!(
        sched.task_context(a),
        Some(before_ctx),
        "signal return must restore the interrupted context byte for byte"
    );
    assert_eq!(
        sched.task_fpu(a),
        Some(fpu),
        "signal return must restore the floating-point image byte for byte"
    );
    assert_eq!(sched.task_signal_mask(a), Some(before_mask));
    assert_eq!(sched.frame_depth(a), 0);
}

#[test]
fn test_signal_restart_rewinds_interrupted_syscall() {
    let (mut platform, mut sched) = boot(1);
    let (pid, a) = spawn(&mut platform, &mut sched, 0x4000, 1);

    sched
        .set_signal_disposition(
            pid,
            SIGINT,
            handler_disposition(0x5000, SigActionFlags::RESTART, SigSet::empty()),
        )
        .expect("handler install must succeed");

    // The task enters a system call: the entry instruction has executed,
    // the call number is captured.
    assert_eq!(sched.run_next(&mut platform, 0), a);
    let mut ctx = sched.task_context(a).expect("task context must exist");
    ctx.instruction_pointer = 0x4000 + SYSCALL_INSN_LEN;
    ctx.syscall_number = 7;
    sched.save_task_context(a, ctx);
    sched.block_current_task(&mut platform, 0, BlockDescriptor::UntilReadable { resource: 9 });
    assert_eq!(sched.run_next(&mut platform, 0), sched.idle_task(0));

    sched
        .signal_process(&mut platform, 0, pid, SIGINT)
        .expect("send must succeed");

    // First selection after the wakeup is the check-free unwind pass.
    assert_eq!(sched.run_next(&mut platform, 0), a);
    assert_eq!(sched.take_wait_result(a), Some(Err(Interrupted)));
    assert_eq!(
        sched.task_context(a).map(|c| c.result),
        Some(Interrupted::RESULT_CODE)
    );
    assert!(platform.placed_frames.is_empty(), "no dispatch during the unwind pass");

    // The next selection dispatches the handler with the call re-armed.
    assert_eq!(sched.run_next(&mut platform, 0), a);
    let (_, frame) = platform
        .placed_frames
        .last()
        .cloned()
        .expect("dispatch must place a frame");
    assert_eq!(
        frame.saved_context.instruction_pointer, 0x4000,
        "restart must rewind over the system-call entry instruction"
    );
    assert_eq!(
        frame.saved_context.result, 7,
        "restart must restore the call number the result register clobbered"
    );

    sched.signal_return(&mut platform, a);
    let restored = sched.task_context(a).expect("task context must exist");
    assert_eq!(restored.instruction_pointer, 0x4000);
    assert_eq!(restored.result, 7);
}

#[test]
fn test_signal_queued_payloads_fifo_per_number() {
    let (mut platform, mut sched) = boot(1);
    let (pid, a) = spawn(&mut platform, &mut sched, 0x1000, 1);

    // NODEFER keeps the signal unmasked inside the handler, so one
    // selection drains the whole queue as nested dispatches.
    sched
        .set_signal_disposition(
            pid,
            SIGUSR2,
            handler_disposition(
                0x5000,
                SigActionFlags::SIGINFO | SigActionFlags::NODEFER,
                SigSet::empty(),
            ),
        )
        .expect("handler install must succeed");

    for value in 1..=3 {
        sched
            .queue_signal_process(
                &mut platform,
                0,
                pid,
                SIGUSR2,
                SigInfo {
                    signo: SIGUSR2 as u64,
                    code: SigInfo::CODE_QUEUED,
                    sender_pid: 99,
                    value,
                },
            )
            .expect("queued send must succeed");
    }

    assert_eq!(sched.run_next(&mut platform, 0), a);
    assert_eq!(sched.frame_depth(a), 3, "nested dispatch must retain all frames");
    let values: Vec<u64> = platform
        .placed_frames
        .iter()
        .map(|(_, f)| f.siginfo.expect("queued dispatch must carry a payload").value)
        .collect();
    assert_eq!(
        values,
        vec![1, 2, 3],
        "payloads of the same number must be delivered in send order"
    );

    sched.signal_return(&mut platform, a);
    sched.signal_return(&mut platform, a);
    sched.signal_return(&mut platform, a);
    assert_eq!(sched.frame_depth(a), 0);
    assert_eq!(sched.pending_signals(a), Some(SigSet::empty()));
}

#[test]
fn test_signal_nodefer_and_resethand_flags() {
    let (mut platform, mut sched) = boot(1);
    let (pid, a) = spawn(&mut platform, &mut sched, 0x1000, 1);

    sched
        .set_signal_disposition(
            pid,
            SIGUSR1,
            handler_disposition(
                0x5000,
                SigActionFlags::NODEFER | SigActionFlags::RESETHAND,
                SigSet::empty(),
            ),
        )
        .expect("handler install must succeed");

    sched
        .task_do_sig(&mut platform, a, SIGUSR1)
        .expect("send must succeed");
    assert_eq!(
        sched.task_signal_mask(a),
        Some(SigSet::empty()),
        "NODEFER must keep the delivered signal unmasked in the handler"
    );
    assert_eq!(
        sched
            .signal_disposition(pid, SIGUSR1)
            .expect("disposition lookup must succeed")
            .handler,
        SignalHandler::Default,
        "RESETHAND must reset the disposition after one delivery"
    );
}

#[test]
fn test_signal_alt_stack_redirects_onstack_handlers() {
    let (mut platform, mut sched) = boot(1);
    let (pid, a) = spawn(&mut platform, &mut sched, 0x1000, 1);

    assert_eq!(
        sched.set_alt_signal_stack(
            pid,
            AltStack {
                base: 0x9000,
                size: 1024,
                flags: AltStackFlags::empty(),
            },
        ),
        Err(KernelError::InvalidStack),
        "an undersized alternate stack must be rejected"
    );

    let alt = AltStack {
        base: 0x9000,
        size: 8192,
        flags: AltStackFlags::empty(),
    };
    sched
        .set_alt_signal_stack(pid, alt)
        .expect("alternate stack install must succeed");
    sched
        .set_signal_disposition(
            pid,
            SIGUSR1,
            handler_disposition(0x5000, SigActionFlags::ONSTACK, SigSet::empty()),
        )
        .expect("handler install must succeed");

    sched
        .task_do_sig(&mut platform, a, SIGUSR1)
        .expect("send must succeed");
    let (_, frame) = platform
        .placed_frames
        .last()
        .cloned()
        .expect("dispatch must place a frame");
    assert_eq!(
        frame.base_sp,
        alt.top(),
        "an ONSTACK handler must be framed on the alternate stack"
    );
}

#[test]
fn test_signal_ignore_discards_without_trace() {
    let (mut platform, mut sched) = boot(1);
    let (pid, a) = spawn(&mut platform, &mut sched, 0x1000, 1);

    sched
        .set_signal_disposition(
            pid,
            SIGUSR2,
            SignalDisposition {
                handler: SignalHandler::Ignore,
                ..SignalDisposition::default()
            },
        )
        .expect("ignore install must succeed");
    sched
        .signal_process(&mut platform, 0, pid, SIGUSR2)
        .expect("send must succeed");

    assert_eq!(
        sched.run_next(&mut platform, 0),
        a,
        "an ignored signal must leave the task schedulable"
    );
    assert_eq!(sched.pending_signals(a), Some(SigSet::empty()));
    assert!(platform.placed_frames.is_empty());
    assert!(platform.events_for(0).is_empty());
}

#[test]
fn test_signal_kill_and_stop_are_protected() {
    let (mut platform, mut sched) = boot(1);
    let (pid, a) = spawn(&mut platform, &mut sched, 0x1000, 1);

    for signo in [SIGKILL, SIGSTOP] {
        assert_eq!(
            sched.set_signal_disposition(
                pid,
                signo,
                handler_disposition(0x5000, SigActionFlags::empty(), SigSet::empty()),
            ),
            Err(KernelError::InvalidSignal),
            "SIGKILL and SIGSTOP dispositions must be immutable"
        );
    }

    sched
        .set_signal_mask(
            a,
            MaskHow::Block,
            SigSet::single(SIGKILL).union(SigSet::single(SIGSTOP)),
        )
        .expect("mask adjust must succeed");
    let mask = sched.task_signal_mask(a).expect("task mask must exist");
    assert!(
        !mask.contains(SIGKILL) && !mask.contains(SIGSTOP),
        "SIGKILL and SIGSTOP must be silently dropped from any mask"
    );
}

#[test]
fn test_signal_handler_requires_restorer() {
    let (mut platform, mut sched) = boot(1);
    let (pid, _a) = spawn(&mut platform, &mut sched, 0x1000, 1);

    assert_eq!(
        sched.set_signal_disposition(
            pid,
            SIGUSR1,
            SignalDisposition {
                handler: SignalHandler::Handler(0x5000),
                flags: SigActionFlags::empty(),
                mask: SigSet::empty(),
                restorer: 0,
            },
        ),
        Err(KernelError::InvalidDisposition),
        "a custom handler without a restorer has no return path"
    );
}

#[test]
fn test_signal_task_targets_one_task() {
    let (mut platform, mut sched) = boot(1);
    let (pid, t1) = spawn(&mut platform, &mut sched, 0x1000, 1);
    let t2 = sched
        .spawn_thread(&mut platform, pid, 0x1100)
        .expect("thread spawn must succeed");

    sched
        .set_signal_mask(t2, MaskHow::Block, SigSet::single(SIGUSR1))
        .expect("mask adjust must succeed");
    sched
        .signal_task(&mut platform, 0, pid, t2, SIGUSR1)
        .expect("task-directed send must succeed");
    assert_eq!(
        sched.pending_signals(t2),
        Some(SigSet::single(SIGUSR1)),
        "a task-directed signal must land on the named task"
    );
    assert_eq!(
        sched.pending_signals(t1),
        Some(SigSet::empty()),
        "a task-directed signal must not touch the process delivery target"
    );
    assert_eq!(
        sched.signal_task(&mut platform, 0, pid, t2 + 50, SIGUSR1),
        Err(KernelError::NoSuchProcess),
        "a task outside the process must be rejected"
    );
}

#[test]
fn test_signal_rejects_invalid_numbers_and_targets() {
    let (mut platform, mut sched) = boot(1);
    let (pid, _a) = spawn(&mut platform, &mut sched, 0x1000, 1);

    assert_eq!(
        sched.signal_process(&mut platform, 0, pid, 0),
        Err(KernelError::InvalidSignal)
    );
    assert_eq!(
        sched.signal_process(&mut platform, 0, pid, 32),
        Err(KernelError::InvalidSignal)
    );
    assert_eq!(
        sched.signal_process(&mut platform, 0, 999, SIGTERM),
        Err(KernelError::NoSuchProcess)
    );
    assert_eq!(
        sched.signal_process_group(&mut platform, 0, 42, SIGTERM),
        Err(KernelError::NoSuchProcess),
        "an empty process group must be reported as no such process"
    );
}
