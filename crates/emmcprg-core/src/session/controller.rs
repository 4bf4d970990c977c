//! Storage session controller.
//!
//! Tracks the logical image selected by the open commands, converts
//! protocol addresses into card sectors and drives the card through the
//! [`BlockDevice`] capability. Every driver call runs with the watchdog
//! suspended.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, instrument};

use super::locator::locate_partition;
use super::state::MultiImageMode;
use crate::protocol::constants::*;
use crate::storage::{Area, BlockDevice, DeviceInfo, DriverStatus, StorageError, sectors_for};
use crate::watchdog::{Suspended, Watchdog};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControllerError {
    #[error("No programmable image selected")]
    NoImage,
    #[error("Image {0:#04X} cannot be opened")]
    UnsupportedImage(u8),
    #[error("No FAT partition found")]
    PartitionNotFound,
    #[error("Payload of {0} bytes exceeds the write buffer")]
    TooLarge(usize),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Target of programming commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogicalImage {
    /// Accept data but do not program it.
    #[default]
    NoProgramming,
    User,
    Boot1,
    Boot2,
    Gpp1,
    Gpp2,
    Gpp3,
    Gpp4,
}

impl LogicalImage {
    pub fn area(self) -> Option<Area> {
        match self {
            LogicalImage::NoProgramming => None,
            LogicalImage::User => Some(Area::User),
            LogicalImage::Boot1 => Some(Area::Boot1),
            LogicalImage::Boot2 => Some(Area::Boot2),
            LogicalImage::Gpp1 => Some(Area::Gpp1),
            LogicalImage::Gpp2 => Some(Area::Gpp2),
            LogicalImage::Gpp3 => Some(Area::Gpp3),
            LogicalImage::Gpp4 => Some(Area::Gpp4),
        }
    }
}

impl fmt::Display for LogicalImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.area() {
            Some(area) => write!(f, "{}", area),
            None => write!(f, "no-programming"),
        }
    }
}

/// Where an open multi-image request lands.
enum Target {
    Image(LogicalImage),
    FatPartition,
    Unsupported,
}

fn target_for(mode: MultiImageMode) -> Target {
    use MultiImageMode::*;
    match mode {
        QcsblHdCfg | Qcsbl | Dbl | AppsBl | Apps | Cefs | AppsCefs | Dsp1 | Dsp2 | Custom
        | FlashBin | Raw => Target::Image(LogicalImage::NoProgramming),
        Oemsbl | Osbl | EmmcBoot0 => Target::Image(LogicalImage::Boot1),
        EmmcBoot1 => Target::Image(LogicalImage::Boot2),
        Amss | EmmcUser => Target::Image(LogicalImage::User),
        EmmcGpp1 => Target::Image(LogicalImage::Gpp1),
        EmmcGpp2 => Target::Image(LogicalImage::Gpp2),
        EmmcGpp3 => Target::Image(LogicalImage::Gpp3),
        EmmcGpp4 => Target::Image(LogicalImage::Gpp4),
        Fsbl => Target::FatPartition,
        Pbl | Obl | FotaUi | EmmcRpmb => Target::Unsupported,
    }
}

/// Storage side of the session.
pub struct StorageController<D: BlockDevice> {
    device: D,
    handles: [Option<D::Handle>; 8],
    /// Boot and general purpose areas can be opened.
    partitions_available: bool,
    image: LogicalImage,
    offset: u32,
    watchdog: Arc<dyn Watchdog>,
    scratch: [u8; MAX_DATA_LENGTH],
}

impl<D: BlockDevice> StorageController<D> {
    pub fn new(device: D, watchdog: Arc<dyn Watchdog>) -> Self {
        Self {
            device,
            handles: [None; 8],
            partitions_available: true,
            image: LogicalImage::NoProgramming,
            offset: 0,
            watchdog,
            scratch: [0; MAX_DATA_LENGTH],
        }
    }

    pub fn set_watchdog(&mut self, watchdog: Arc<dyn Watchdog>) {
        self.watchdog = watchdog;
    }

    pub fn image(&self) -> LogicalImage {
        self.image
    }

    /// Sector offset added to every write address.
    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn device_name(&self) -> Option<&str> {
        self.device.device_name()
    }

    /// Open the user area and make it the boot area. Cards without boot
    /// partition support stay usable through the user area only.
    #[instrument(skip(self))]
    pub fn open_device(&mut self) -> Result<(), ControllerError> {
        if self.handles[Area::User.index() as usize].is_some() {
            return Ok(());
        }
        let user = {
            let _wd = Suspended::new(&*self.watchdog);
            self.device.open(Area::User)?
        };
        self.handles[Area::User.index() as usize] = Some(user);

        let _wd = Suspended::new(&*self.watchdog);
        match self.device.set_active_boot(user) {
            Ok(()) => {
                self.partitions_available = true;
                Ok(())
            }
            Err(e) if e.status() == Some(DriverStatus::FeatureUnsupported) => {
                info!("Card has no boot partition support");
                self.partitions_available = false;
                Ok(())
            }
            Err(e) => {
                self.handles[Area::User.index() as usize] = None;
                Err(e.into())
            }
        }
    }

    /// Cached handle for `area`, opening it on first use.
    fn handle(&mut self, area: Area) -> Result<D::Handle, ControllerError> {
        let slot = area.index() as usize;
        if let Some(h) = self.handles[slot] {
            return Ok(h);
        }
        if area != Area::User && !self.partitions_available {
            return Err(StorageError::Unavailable(area).into());
        }
        let _wd = Suspended::new(&*self.watchdog);
        let h = self.device.open(area)?;
        self.handles[slot] = Some(h);
        debug!(area = %area, "Area opened");
        Ok(h)
    }

    /// Handle of the selected image, `None` when nothing is programmed.
    fn image_handle(&mut self) -> Result<Option<(Area, D::Handle)>, ControllerError> {
        match self.image.area() {
            Some(area) => Ok(Some((area, self.handle(area)?))),
            None => Ok(None),
        }
    }

    /// Select the image for an open multi-image request.
    pub fn select_image(&mut self, mode: MultiImageMode) -> Result<(LogicalImage, u32), ControllerError> {
        self.open_device()?;
        let (image, offset) = match target_for(mode) {
            Target::Image(image) => (image, 0),
            Target::FatPartition => (LogicalImage::User, self.locate_fat_partition()?),
            Target::Unsupported => return Err(ControllerError::UnsupportedImage(mode as u8)),
        };
        self.image = image;
        self.offset = offset;
        info!(image = %image, offset = offset, "Image selected");
        Ok((image, offset))
    }

    /// Forget the selected image.
    pub fn deselect(&mut self) {
        self.image = LogicalImage::NoProgramming;
        self.offset = 0;
    }

    fn locate_fat_partition(&mut self) -> Result<u32, ControllerError> {
        let user = self.handle(Area::User)?;
        for kind in FAT_PARTITION_TYPES {
            let _wd = Suspended::new(&*self.watchdog);
            if let Some(start) = locate_partition(&mut self.device, user, kind) {
                debug!(kind = kind, start = start, "FAT partition located");
                return Ok(start);
            }
        }
        Err(ControllerError::PartitionNotFound)
    }

    /// Sector for a protocol address.
    fn sector_of(address: u32, sector_addresses: bool) -> u32 {
        if sector_addresses {
            address
        } else {
            address / BLOCK_SIZE as u32
        }
    }

    /// Program `data` at `address` of the selected image.
    ///
    /// Returns the first sector written, or `None` when nothing is
    /// programmed.
    pub fn write(
        &mut self,
        address: u32,
        data: &[u8],
        sector_addresses: bool,
    ) -> Result<Option<(u32, u32)>, ControllerError> {
        let Some((area, handle)) = self.image_handle()? else {
            return Ok(None);
        };
        if data.len() > self.scratch.len() {
            return Err(ControllerError::TooLarge(data.len()));
        }

        if area == Area::Boot1 && address == 0 && has_active_entry(data) {
            info!("Boot image carries an active partition, marking boot1 bootable");
            let _wd = Suspended::new(&*self.watchdog);
            self.device.set_active_boot(handle)?;
        }

        let start = Self::sector_of(address, sector_addresses).wrapping_add(self.offset);
        let count = sectors_for(data.len());
        let padded = count as usize * BLOCK_SIZE;
        self.scratch[..data.len()].copy_from_slice(data);
        self.scratch[data.len()..padded].fill(0);

        let _wd = Suspended::new(&*self.watchdog);
        self.device
            .write(handle, start, count, &self.scratch[..padded])?;
        Ok(Some((start, count)))
    }

    /// Blank the selected image. The user area is erased in full, other
    /// areas only get their first and last sector zeroed.
    #[instrument(skip(self))]
    pub fn erase(&mut self) -> Result<(), ControllerError> {
        let Some((area, handle)) = self.image_handle()? else {
            return Ok(());
        };
        let info = {
            let _wd = Suspended::new(&*self.watchdog);
            self.device.device_info(handle)?
        };
        let last = info.card_size_in_sectors.saturating_sub(1);

        if area == Area::User {
            let _wd = Suspended::new(&*self.watchdog);
            self.device.erase(handle, 0, last)?;
        } else {
            self.scratch[..BLOCK_SIZE].fill(0);
            for sector in [0, last] {
                let _wd = Suspended::new(&*self.watchdog);
                self.device
                    .write(handle, sector, 1, &self.scratch[..BLOCK_SIZE])?;
            }
        }
        info!(area = %area, sectors = info.card_size_in_sectors, "Erased");
        Ok(())
    }

    /// Read `out.len()` bytes at `address` into `out`.
    ///
    /// Only the user and boot1 images are readable; other selections
    /// leave `out` zeroed. Byte addresses are rounded up to the next
    /// sector and the session offset is not applied.
    pub fn read(
        &mut self,
        address: u32,
        out: &mut [u8],
        sector_addresses: bool,
    ) -> Result<(), ControllerError> {
        out.fill(0);
        let area = match self.image {
            LogicalImage::User => Area::User,
            LogicalImage::Boot1 => Area::Boot1,
            _ => return Ok(()),
        };
        if out.len() > self.scratch.len() {
            return Err(ControllerError::TooLarge(out.len()));
        }
        let handle = self.handle(area)?;
        let start = if sector_addresses {
            address
        } else {
            address.div_ceil(BLOCK_SIZE as u32)
        };
        let count = sectors_for(out.len());
        let padded = count as usize * BLOCK_SIZE;

        let _wd = Suspended::new(&*self.watchdog);
        self.device
            .read(handle, start, count, &mut self.scratch[..padded])?;
        let len = out.len();
        out.copy_from_slice(&self.scratch[..len]);
        Ok(())
    }

    /// Make the selected image's area the boot area.
    pub fn set_active_boot(&mut self) -> Result<(), ControllerError> {
        let (_, handle) = self.image_handle()?.ok_or(ControllerError::NoImage)?;
        let _wd = Suspended::new(&*self.watchdog);
        self.device.set_active_boot(handle)?;
        Ok(())
    }

    /// Partition the card into general purpose areas.
    pub fn create_gpp(&mut self, sizes: [u32; 4]) -> Result<(), ControllerError> {
        let Some((_, handle)) = self.image_handle()? else {
            return Ok(());
        };
        let _wd = Suspended::new(&*self.watchdog);
        self.device.configure_gpp(handle, sizes)?;
        // Newly created areas must be reopened.
        for area in [Area::Gpp1, Area::Gpp2, Area::Gpp3, Area::Gpp4] {
            self.handles[area.index() as usize] = None;
        }
        Ok(())
    }

    /// Zero `count` sectors from `start` of the selected image, a few
    /// sectors per driver call. The session offset is not applied.
    #[instrument(skip(self))]
    pub fn zero_out(&mut self, start: u32, count: u32) -> Result<(), ControllerError> {
        let (_, handle) = self.image_handle()?.ok_or(ControllerError::NoImage)?;
        let chunk = ZERO_OUT_CHUNK_SECTORS.min(count) as usize * BLOCK_SIZE;
        self.scratch[..chunk].fill(0);

        let mut sector = start;
        let mut remaining = count;
        while remaining > 0 {
            let step = remaining.min(ZERO_OUT_CHUNK_SECTORS);
            let _wd = Suspended::new(&*self.watchdog);
            self.device.write(
                handle,
                sector,
                step,
                &self.scratch[..step as usize * BLOCK_SIZE],
            )?;
            sector = sector.wrapping_add(step);
            remaining -= step;
        }
        Ok(())
    }

    /// Info for the selected image, `None` when nothing is programmed.
    pub fn partition_info(&mut self) -> Result<Option<DeviceInfo>, ControllerError> {
        let Some((_, handle)) = self.image_handle()? else {
            return Ok(None);
        };
        let _wd = Suspended::new(&*self.watchdog);
        Ok(Some(self.device.device_info(handle)?))
    }
}

/// Whether a boot record holds an active ("bootable") entry.
fn has_active_entry(sector: &[u8]) -> bool {
    MBR_ENTRY_OFFSETS
        .iter()
        .any(|&off| sector.get(off + MBR_ENTRY_STATUS) == Some(&MBR_ACTIVE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryDevice, OpKind, StorageOp};
    use crate::watchdog::{CountingWatchdog, NullWatchdog};

    fn controller(dev: &MemoryDevice) -> StorageController<MemoryDevice> {
        StorageController::new(dev.clone(), Arc::new(NullWatchdog))
    }

    #[test]
    fn test_open_device_sets_user_bootable() {
        let dev = MemoryDevice::new(64, 8);
        let mut ctl = controller(&dev);
        ctl.open_device().unwrap();
        assert_eq!(dev.active_boot(), Some(Area::User));
        // Second open is a no-op
        dev.clear_journal();
        ctl.open_device().unwrap();
        assert!(dev.journal().is_empty());
    }

    #[test]
    fn test_no_boot_support_limits_areas() {
        let dev = MemoryDevice::new(64, 8).without_boot_select();
        let mut ctl = controller(&dev);
        ctl.select_image(MultiImageMode::EmmcBoot0).unwrap();
        assert!(matches!(
            ctl.write(0, &[1; 16], false),
            Err(ControllerError::Storage(StorageError::Unavailable(Area::Boot1)))
        ));
        ctl.select_image(MultiImageMode::EmmcUser).unwrap();
        assert!(ctl.write(0, &[1; 16], false).is_ok());
    }

    #[test]
    fn test_open_device_failure() {
        let dev = MemoryDevice::new(64, 8);
        dev.fail(OpKind::SetActiveBoot, None, DriverStatus::Switch);
        let mut ctl = controller(&dev);
        assert!(ctl.open_device().is_err());
    }

    #[test]
    fn test_image_table() {
        let dev = MemoryDevice::new(64, 8);
        dev.add_area(Area::Gpp3, 8);
        let mut ctl = controller(&dev);
        let cases = [
            (MultiImageMode::Oemsbl, LogicalImage::Boot1),
            (MultiImageMode::Osbl, LogicalImage::Boot1),
            (MultiImageMode::Amss, LogicalImage::User),
            (MultiImageMode::EmmcBoot1, LogicalImage::Boot2),
            (MultiImageMode::EmmcGpp3, LogicalImage::Gpp3),
            (MultiImageMode::Apps, LogicalImage::NoProgramming),
            (MultiImageMode::Raw, LogicalImage::NoProgramming),
        ];
        for (mode, image) in cases {
            assert_eq!(ctl.select_image(mode).unwrap(), (image, 0), "{:?}", mode);
        }
        for mode in [MultiImageMode::Pbl, MultiImageMode::EmmcRpmb] {
            assert_eq!(
                ctl.select_image(mode),
                Err(ControllerError::UnsupportedImage(mode as u8))
            );
        }
        // Failed selection keeps the previous image
        assert_eq!(ctl.image(), LogicalImage::NoProgramming);
    }

    fn mbr(entries: &[(u8, u32)]) -> Vec<u8> {
        let mut sector = vec![0u8; BLOCK_SIZE];
        for (i, &(kind, start)) in entries.iter().enumerate() {
            let base = MBR_ENTRY_OFFSETS[i];
            sector[base + MBR_ENTRY_TYPE] = kind;
            sector[base + MBR_ENTRY_START..base + MBR_ENTRY_START + 4]
                .copy_from_slice(&start.to_le_bytes());
        }
        sector
    }

    #[test]
    fn test_fat_remap_priority() {
        let dev = MemoryDevice::new(256, 8);
        dev.preload(Area::User, 0, &mbr(&[(0x0E, 40), (0x0C, 30), (0, 0), (0, 0)]));
        let mut ctl = controller(&dev);
        assert_eq!(
            ctl.select_image(MultiImageMode::Fsbl).unwrap(),
            (LogicalImage::User, 30)
        );

        ctl.write(0x400, &[0xEE; 10], false).unwrap();
        assert_eq!(dev.sector(Area::User, 32)[..10], [0xEE; 10]);
    }

    #[test]
    fn test_fat_remap_not_found() {
        let dev = MemoryDevice::new(256, 8);
        dev.preload(Area::User, 0, &mbr(&[(0x83, 40)]));
        let mut ctl = controller(&dev);
        assert_eq!(
            ctl.select_image(MultiImageMode::Fsbl),
            Err(ControllerError::PartitionNotFound)
        );
    }

    #[test]
    fn test_write_address_modes() {
        let dev = MemoryDevice::new(64, 8);
        let mut ctl = controller(&dev);
        ctl.select_image(MultiImageMode::EmmcUser).unwrap();

        assert_eq!(ctl.write(0x600, &[1; 513], false).unwrap(), Some((3, 2)));
        assert_eq!(ctl.write(5, &[2; 4], true).unwrap(), Some((5, 1)));
        assert_eq!(dev.sector(Area::User, 5)[..5], [2, 2, 2, 2, 0]);
    }

    #[test]
    fn test_write_without_image_is_skipped() {
        let dev = MemoryDevice::new(64, 8);
        let mut ctl = controller(&dev);
        assert_eq!(ctl.write(0, &[1; 4], false).unwrap(), None);
        assert!(dev.journal().is_empty());
    }

    #[test]
    fn test_boot1_active_marker() {
        let dev = MemoryDevice::new(64, 8);
        let mut ctl = controller(&dev);
        ctl.select_image(MultiImageMode::EmmcBoot0).unwrap();
        assert_eq!(dev.active_boot(), Some(Area::User));

        let mut sector = vec![0u8; BLOCK_SIZE];
        sector[0x1DE] = MBR_ACTIVE;
        ctl.write(0, &sector, false).unwrap();
        assert_eq!(dev.active_boot(), Some(Area::Boot1));
    }

    #[test]
    fn test_boot1_marker_only_at_sector_zero() {
        let dev = MemoryDevice::new(64, 8);
        let mut ctl = controller(&dev);
        ctl.select_image(MultiImageMode::EmmcBoot0).unwrap();
        let mut sector = vec![0u8; BLOCK_SIZE];
        sector[0x1BE] = MBR_ACTIVE;
        ctl.write(0x200, &sector, false).unwrap();
        assert_eq!(dev.active_boot(), Some(Area::User));
    }

    #[test]
    fn test_erase_non_user_touches_two_sectors() {
        let dev = MemoryDevice::new(64, 8);
        dev.fill(Area::Boot2, 0xFF);
        let mut ctl = controller(&dev);
        ctl.select_image(MultiImageMode::EmmcBoot1).unwrap();
        dev.clear_journal();
        ctl.erase().unwrap();

        let writes: Vec<_> = dev
            .journal()
            .into_iter()
            .filter(|op| matches!(op, StorageOp::Write { .. }))
            .collect();
        assert_eq!(
            writes,
            vec![
                StorageOp::Write { area: Area::Boot2, start: 0, count: 1 },
                StorageOp::Write { area: Area::Boot2, start: 7, count: 1 },
            ]
        );
        assert_eq!(dev.sector(Area::Boot2, 0), vec![0; BLOCK_SIZE]);
        for s in 1..7 {
            assert_eq!(dev.sector(Area::Boot2, s), vec![0xFF; BLOCK_SIZE]);
        }
        assert_eq!(dev.sector(Area::Boot2, 7), vec![0; BLOCK_SIZE]);
    }

    #[test]
    fn test_erase_user_full_range() {
        let dev = MemoryDevice::new(64, 8);
        let mut ctl = controller(&dev);
        ctl.select_image(MultiImageMode::Amss).unwrap();
        dev.clear_journal();
        ctl.erase().unwrap();
        assert!(dev.journal().contains(&StorageOp::Erase {
            area: Area::User,
            start: 0,
            end: 63
        }));
    }

    #[test]
    fn test_read_rounds_byte_address_up() {
        let dev = MemoryDevice::new(64, 8);
        dev.preload(Area::User, 2, &[0x22; 4]);
        let mut ctl = controller(&dev);
        ctl.select_image(MultiImageMode::EmmcUser).unwrap();

        // 0x201 rounds up to sector 2, unlike a write to the same address
        let mut out = [0u8; 4];
        ctl.read(0x201, &mut out, false).unwrap();
        assert_eq!(out, [0x22; 4]);
    }

    #[test]
    fn test_read_ignores_offset_and_other_images() {
        let dev = MemoryDevice::new(256, 8);
        dev.preload(Area::User, 0, &mbr(&[(0x0B, 100)]));
        let mut ctl = controller(&dev);
        ctl.select_image(MultiImageMode::Fsbl).unwrap();
        let mut out = [0u8; 2];
        ctl.read(0, &mut out, true).unwrap();
        // Sector 0 of the card, not of the partition
        assert_eq!(out, [0, 0]);
        assert!(dev.journal().contains(&StorageOp::Read {
            area: Area::User,
            start: 0,
            count: 1
        }));

        ctl.select_image(MultiImageMode::EmmcBoot1).unwrap();
        dev.clear_journal();
        let mut out = [0xAAu8; 8];
        ctl.read(0, &mut out, true).unwrap();
        assert_eq!(out, [0; 8]);
        assert!(dev.journal().is_empty());
    }

    #[test]
    fn test_zero_out_chunks() {
        let dev = MemoryDevice::new(64, 8);
        dev.fill(Area::User, 0x11);
        let mut ctl = controller(&dev);
        ctl.select_image(MultiImageMode::EmmcUser).unwrap();
        dev.clear_journal();
        ctl.zero_out(10, 5).unwrap();

        assert_eq!(
            dev.journal(),
            vec![
                StorageOp::Write { area: Area::User, start: 10, count: 2 },
                StorageOp::Write { area: Area::User, start: 12, count: 2 },
                StorageOp::Write { area: Area::User, start: 14, count: 1 },
            ]
        );
        assert_eq!(dev.sector(Area::User, 9), vec![0x11; BLOCK_SIZE]);
        assert_eq!(dev.sector(Area::User, 14), vec![0; BLOCK_SIZE]);
        assert_eq!(dev.sector(Area::User, 15), vec![0x11; BLOCK_SIZE]);
    }

    #[test]
    fn test_no_image_operations() {
        let dev = MemoryDevice::new(64, 8);
        let mut ctl = controller(&dev);
        assert_eq!(ctl.set_active_boot(), Err(ControllerError::NoImage));
        assert_eq!(ctl.zero_out(0, 1), Err(ControllerError::NoImage));
        assert_eq!(ctl.partition_info(), Ok(None));
        assert!(ctl.erase().is_ok());
        assert!(ctl.create_gpp([1, 0, 0, 0]).is_ok());
        assert!(dev.journal().is_empty());
    }

    #[test]
    fn test_create_gpp_then_open() {
        let dev = MemoryDevice::new(64, 8);
        let mut ctl = controller(&dev);
        ctl.select_image(MultiImageMode::EmmcUser).unwrap();
        ctl.create_gpp([16, 0, 0, 0]).unwrap();
        ctl.select_image(MultiImageMode::EmmcGpp1).unwrap();
        assert_eq!(ctl.partition_info().unwrap().unwrap().card_size_in_sectors, 16);
    }

    #[test]
    fn test_watchdog_balanced() {
        let dev = MemoryDevice::new(64, 8);
        let wd = Arc::new(CountingWatchdog::new());
        let mut ctl = StorageController::new(dev.clone(), wd.clone());
        ctl.select_image(MultiImageMode::EmmcUser).unwrap();
        ctl.zero_out(0, 6).unwrap();
        ctl.erase().unwrap();
        assert!(wd.suspends() >= 5);
        assert_eq!(wd.outstanding(), 0);
    }
}
