//! Bundled vendor drivers

pub mod intel;
pub mod nvidia;
pub mod xilinx;

pub use intel::IntelQatDriver;
pub use nvidia::NvidiaGpuDriver;
pub use xilinx::XilinxFpgaDriver;
