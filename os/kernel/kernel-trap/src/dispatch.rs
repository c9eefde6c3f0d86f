use crate::environment::{TrapEnvironment, TrapProcess};
use crate::page_fault::{FaultOutcome, PageFaultError, resolve_page_fault};
use crate::ring::Ring;
use crate::trap_frame::TrapFrame;
use crate::vectors::TrapCause;
use log::{error, trace, warn};

/// Common trap entry, called by the assembly stubs with the saved frame.
///
/// Returns when the interrupted code may resume. A process that is marked
/// killed and trapped from user mode exits on the way out; one that was in
/// the kernel keeps running until its regular return to user mode.
///
/// # Panics
/// On an unexpected trap in kernel mode or without a current process.
pub fn trap<E: TrapEnvironment + ?Sized>(env: &E, tf: &mut TrapFrame) {
    match TrapCause::from_vector(tf.vector) {
        TrapCause::Syscall => {
            system_call(env, tf);
            return;
        }
        TrapCause::Timer => {
            if env.cpu_id() == 0 {
                let now = env.ticks().advance();
                env.wakeup_ticks(now);
            }
            env.acknowledge_interrupt();
        }
        TrapCause::Device(device) => {
            env.device_interrupt(device);
            env.acknowledge_interrupt();
        }
        TrapCause::SecondaryIde => {}
        TrapCause::Spurious => {
            warn!(
                "cpu{}: spurious interrupt at {:#x}:{:#x}",
                env.cpu_id(),
                tf.cs,
                tf.rip
            );
            env.acknowledge_interrupt();
        }
        TrapCause::PageFault => page_fault(env, tf),
        TrapCause::Other(_) => unexpected_trap(env, tf),
    }

    if let Some(process) = env.current_process()
        && process.is_killed()
        && tf.ring().is_user()
    {
        env.exit();
    }
}

fn system_call<E: TrapEnvironment + ?Sized>(env: &E, tf: &mut TrapFrame) {
    let Some(process) = env.current_process() else {
        return unexpected_trap(env, tf);
    };
    if process.is_killed() {
        env.exit();
        return;
    }
    env.syscall(tf);
    if process.is_killed() {
        env.exit();
    }
}

fn page_fault<E: TrapEnvironment + ?Sized>(env: &E, tf: &TrapFrame) {
    let Some(process) = env.current_process() else {
        return unexpected_trap(env, tf);
    };

    let fault_address = env.fault_address();
    let error = PageFaultError::from_bits(tf.error_code);
    let outcome = resolve_page_fault(
        env.frames(),
        env,
        process.page_table_root(),
        fault_address,
        error,
    );

    match outcome {
        FaultOutcome::Resolved(resolution) => {
            trace!("pid {}: {resolution:?}", process.pid());
        }
        FaultOutcome::Kill(reason) => {
            warn!(
                "pid {} {}: page fault at {fault_address} on cpu {} rip {:#x}: {reason}--kill proc",
                process.pid(),
                process.name(),
                env.cpu_id(),
                tf.rip
            );
            process.kill();
        }
        FaultOutcome::Unhandled => unexpected_trap(env, tf),
    }
}

/// A trap nobody handles: the kernel's own mistake is fatal, a user
/// process is assumed to have misbehaved and gets killed.
fn unexpected_trap<E: TrapEnvironment + ?Sized>(env: &E, tf: &TrapFrame) {
    let cr2 = env.fault_address().as_u64();
    match env.current_process() {
        Some(process) if tf.ring() != Ring::Ring0 => {
            warn!(
                "pid {} {}: trap {} err {} on cpu {} rip {:#x} addr {cr2:#x}--kill proc",
                process.pid(),
                process.name(),
                tf.vector,
                tf.error_code,
                env.cpu_id(),
                tf.rip
            );
            process.kill();
        }
        _ => {
            error!(
                "unexpected trap {} from cpu {} rip {:#x} (cr2={cr2:#x})",
                tf.vector,
                env.cpu_id(),
                tf.rip
            );
            panic!("unexpected trap {} in kernel mode", tf.vector);
        }
    }
}
