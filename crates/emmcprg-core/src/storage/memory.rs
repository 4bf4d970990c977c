//! RAM-backed card for testing.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::traits::{Area, BlockDevice, DeviceInfo, DriverStatus, StorageError};
use crate::protocol::constants::{BLOCK_SIZE, DEVICE_NAME};

/// Operation recorded in the journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageOp {
    Open(Area),
    Read { area: Area, start: u32, count: u32 },
    Write { area: Area, start: u32, count: u32 },
    Erase { area: Area, start: u32, end: u32 },
    DeviceInfo(Area),
    SetActiveBoot(Area),
    ConfigureGpp([u32; 4]),
}

/// Operation class used for failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Open,
    Read,
    Write,
    Erase,
    DeviceInfo,
    SetActiveBoot,
    ConfigureGpp,
}

#[derive(Debug)]
struct Failure {
    kind: OpKind,
    area: Option<Area>,
    status: DriverStatus,
}

#[derive(Debug, Default)]
struct Inner {
    areas: BTreeMap<Area, Vec<u8>>,
    active_boot: Option<Area>,
    boot_select_supported: bool,
    journal: Vec<StorageOp>,
    failures: Vec<Failure>,
}

impl Inner {
    fn check(&self, kind: OpKind, area: Area) -> Result<(), StorageError> {
        match self
            .failures
            .iter()
            .find(|f| f.kind == kind && f.area.is_none_or(|a| a == area))
        {
            Some(f) => Err(StorageError::Driver {
                area,
                status: f.status,
            }),
            None => Ok(()),
        }
    }

    fn range(&self, area: Area, start: u32, count: u32) -> Result<(usize, usize), StorageError> {
        let data = self.areas.get(&area).ok_or(StorageError::Unavailable(area))?;
        let size = (data.len() / BLOCK_SIZE) as u32;
        if start.checked_add(count).is_none_or(|end| end > size) {
            return Err(StorageError::OutOfRange {
                area,
                start,
                count,
                size,
            });
        }
        let from = start as usize * BLOCK_SIZE;
        Ok((from, from + count as usize * BLOCK_SIZE))
    }
}

/// In-memory card with a journal of every driver call.
///
/// Clones share state, so a test keeps one handle while the engine owns
/// another.
#[derive(Debug, Clone)]
pub struct MemoryDevice {
    inner: Arc<Mutex<Inner>>,
    name: Option<&'static str>,
}

impl MemoryDevice {
    /// User area plus both boot areas, no general purpose areas.
    pub fn new(user_sectors: u32, boot_sectors: u32) -> Self {
        let device = Self {
            inner: Arc::new(Mutex::new(Inner {
                boot_select_supported: true,
                ..Default::default()
            })),
            name: Some(DEVICE_NAME),
        };
        device.add_area(Area::User, user_sectors);
        device.add_area(Area::Boot1, boot_sectors);
        device.add_area(Area::Boot2, boot_sectors);
        device
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add (or resize) an area, zero filled.
    pub fn add_area(&self, area: Area, sectors: u32) {
        self.lock()
            .areas
            .insert(area, vec![0; sectors as usize * BLOCK_SIZE]);
    }

    pub fn remove_area(&self, area: Area) {
        self.lock().areas.remove(&area);
    }

    /// Report `name` (or no name) in the hello reply.
    pub fn with_name(mut self, name: Option<&'static str>) -> Self {
        self.name = name;
        self
    }

    /// Card without boot partition selection.
    pub fn without_boot_select(self) -> Self {
        self.lock().boot_select_supported = false;
        self
    }

    /// Fail every `kind` operation (optionally only on `area`).
    pub fn fail(&self, kind: OpKind, area: Option<Area>, status: DriverStatus) {
        self.lock().failures.push(Failure { kind, area, status });
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    /// Copy of one sector, bypassing the journal.
    pub fn sector(&self, area: Area, sector: u32) -> Vec<u8> {
        let inner = self.lock();
        let start = sector as usize * BLOCK_SIZE;
        inner
            .areas
            .get(&area)
            .and_then(|d| d.get(start..start + BLOCK_SIZE))
            .map(<[u8]>::to_vec)
            .unwrap_or_default()
    }

    /// Store bytes at the start of a sector, bypassing the journal.
    pub fn preload(&self, area: Area, sector: u32, bytes: &[u8]) {
        let mut inner = self.lock();
        if let Some(data) = inner.areas.get_mut(&area) {
            let start = sector as usize * BLOCK_SIZE;
            if let Some(dst) = data.get_mut(start..start + bytes.len()) {
                dst.copy_from_slice(bytes);
            }
        }
    }

    /// Fill an entire area with `value`, bypassing the journal.
    pub fn fill(&self, area: Area, value: u8) {
        if let Some(data) = self.lock().areas.get_mut(&area) {
            data.fill(value);
        }
    }

    pub fn sectors(&self, area: Area) -> u32 {
        self.lock()
            .areas
            .get(&area)
            .map_or(0, |d| (d.len() / BLOCK_SIZE) as u32)
    }

    pub fn active_boot(&self) -> Option<Area> {
        self.lock().active_boot
    }

    pub fn journal(&self) -> Vec<StorageOp> {
        self.lock().journal.clone()
    }

    pub fn clear_journal(&self) {
        self.lock().journal.clear();
    }
}

impl Default for MemoryDevice {
    fn default() -> Self {
        Self::new(4096, 64)
    }
}

impl BlockDevice for MemoryDevice {
    type Handle = Area;

    fn open(&mut self, area: Area) -> Result<Area, StorageError> {
        let mut inner = self.lock();
        inner.journal.push(StorageOp::Open(area));
        inner.check(OpKind::Open, area)?;
        if !inner.areas.contains_key(&area) {
            return Err(StorageError::Driver {
                area,
                status: DriverStatus::CardUndetected,
            });
        }
        Ok(area)
    }

    fn read(&mut self, area: Area, start: u32, count: u32, buf: &mut [u8]) -> Result<(), StorageError> {
        let mut inner = self.lock();
        inner.journal.push(StorageOp::Read { area, start, count });
        inner.check(OpKind::Read, area)?;
        let (from, to) = inner.range(area, start, count)?;
        let src = &inner.areas[&area][from..to];
        buf[..src.len()].copy_from_slice(src);
        Ok(())
    }

    fn write(&mut self, area: Area, start: u32, count: u32, data: &[u8]) -> Result<(), StorageError> {
        let mut inner = self.lock();
        inner.journal.push(StorageOp::Write { area, start, count });
        inner.check(OpKind::Write, area)?;
        let (from, to) = inner.range(area, start, count)?;
        if let Some(dst) = inner.areas.get_mut(&area) {
            dst[from..to].copy_from_slice(&data[..to - from]);
        }
        Ok(())
    }

    fn erase(&mut self, area: Area, start: u32, end: u32) -> Result<(), StorageError> {
        let mut inner = self.lock();
        inner.journal.push(StorageOp::Erase { area, start, end });
        inner.check(OpKind::Erase, area)?;
        let count = end.saturating_sub(start) + 1;
        let (from, to) = inner.range(area, start, count)?;
        if let Some(dst) = inner.areas.get_mut(&area) {
            dst[from..to].fill(0);
        }
        Ok(())
    }

    fn device_info(&mut self, area: Area) -> Result<DeviceInfo, StorageError> {
        let mut inner = self.lock();
        inner.journal.push(StorageOp::DeviceInfo(area));
        inner.check(OpKind::DeviceInfo, area)?;
        let data = inner.areas.get(&area).ok_or(StorageError::Unavailable(area))?;
        Ok(DeviceInfo {
            card_size_in_sectors: (data.len() / BLOCK_SIZE) as u32,
            block_len: BLOCK_SIZE as u32,
            write_protect_group_size: 0,
            num_phy_partitions: inner.areas.len() as u8,
            is_bootable: inner.active_boot == Some(area),
            manufacturer_id: 0x15,
            oem_id: 0x0100,
            product_name: *b"MEMDEV",
            product_rev: 1,
            serial_num: 0x1234_5678,
        })
    }

    fn set_active_boot(&mut self, area: Area) -> Result<(), StorageError> {
        let mut inner = self.lock();
        inner.journal.push(StorageOp::SetActiveBoot(area));
        if !inner.boot_select_supported {
            return Err(StorageError::Driver {
                area,
                status: DriverStatus::FeatureUnsupported,
            });
        }
        inner.check(OpKind::SetActiveBoot, area)?;
        inner.active_boot = Some(area);
        Ok(())
    }

    fn configure_gpp(&mut self, area: Area, sizes: [u32; 4]) -> Result<(), StorageError> {
        let mut inner = self.lock();
        inner.journal.push(StorageOp::ConfigureGpp(sizes));
        inner.check(OpKind::ConfigureGpp, area)?;
        let gpps = [Area::Gpp1, Area::Gpp2, Area::Gpp3, Area::Gpp4];
        for (gpp, size) in gpps.into_iter().zip(sizes) {
            if size == 0 {
                inner.areas.remove(&gpp);
            } else {
                inner.areas.insert(gpp, vec![0; size as usize * BLOCK_SIZE]);
            }
        }
        Ok(())
    }

    fn device_name(&self) -> Option<&str> {
        self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_read_back() {
        let mut dev = MemoryDevice::new(16, 4);
        let h = dev.open(Area::User).unwrap();
        let data = vec![0xA5; 2 * BLOCK_SIZE];
        dev.write(h, 3, 2, &data).unwrap();

        let mut buf = vec![0; 2 * BLOCK_SIZE];
        dev.read(h, 3, 2, &mut buf).unwrap();
        assert_eq!(buf, data);
        assert_eq!(dev.sector(Area::User, 2), vec![0; BLOCK_SIZE]);
    }

    #[test]
    fn test_out_of_range() {
        let mut dev = MemoryDevice::new(4, 4);
        let h = dev.open(Area::User).unwrap();
        assert!(matches!(
            dev.write(h, 4, 1, &[0; BLOCK_SIZE]),
            Err(StorageError::OutOfRange { size: 4, .. })
        ));
    }

    #[test]
    fn test_missing_area() {
        let mut dev = MemoryDevice::new(4, 4);
        assert!(matches!(
            dev.open(Area::Gpp1),
            Err(StorageError::Driver {
                status: DriverStatus::CardUndetected,
                ..
            })
        ));
    }

    #[test]
    fn test_failure_injection() {
        let mut dev = MemoryDevice::new(4, 4);
        dev.fail(OpKind::Write, Some(Area::Boot1), DriverStatus::WpViolation);
        assert!(dev.write(Area::User, 0, 1, &[0; BLOCK_SIZE]).is_ok());
        let err = dev.write(Area::Boot1, 0, 1, &[0; BLOCK_SIZE]).unwrap_err();
        assert_eq!(err.status(), Some(DriverStatus::WpViolation));
    }

    #[test]
    fn test_configure_gpp_creates_areas() {
        let mut dev = MemoryDevice::new(4, 4);
        dev.configure_gpp(Area::User, [8, 0, 2, 0]).unwrap();
        assert_eq!(dev.sectors(Area::Gpp1), 8);
        assert_eq!(dev.sectors(Area::Gpp2), 0);
        assert_eq!(dev.sectors(Area::Gpp3), 2);
        assert!(dev.open(Area::Gpp3).is_ok());
    }

    #[test]
    fn test_boot_select_unsupported() {
        let mut dev = MemoryDevice::new(4, 4).without_boot_select();
        let err = dev.set_active_boot(Area::User).unwrap_err();
        assert_eq!(err.status(), Some(DriverStatus::FeatureUnsupported));
        assert_eq!(dev.active_boot(), None);
    }

    #[test]
    fn test_journal_shared_between_clones() {
        let dev = MemoryDevice::new(4, 4);
        let mut engine_side = dev.clone();
        engine_side.erase(Area::User, 0, 3).unwrap();
        assert_eq!(
            dev.journal(),
            vec![StorageOp::Erase {
                area: Area::User,
                start: 0,
                end: 3
            }]
        );
    }
}
