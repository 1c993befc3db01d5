// Vacancy Watch Infrastructure - System Adapters
// Implements: JobExecutor, ProcessProbe

pub mod process_probe_impl;
pub mod subprocess_executor;

pub use process_probe_impl::ProcessProbeImpl;
pub use subprocess_executor::SubprocessExecutor;
