//! 块设备抽象
//!
//! block/device.rs 定义缓存依赖的同步读写接口，由设备驱动实现；
//! block/ramdisk.rs 提供一个内存设备，供测试和没有真实磁盘的环境使用。

mod device;
mod ramdisk;

pub use device::BlockDevice;
pub use ramdisk::RamDisk;
