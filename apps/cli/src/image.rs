//! File-backed card: one image file per area in a directory.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use emmcprg_core::protocol::BLOCK_SIZE;
use emmcprg_core::{Area, BlockDevice, DeviceInfo, DriverStatus, StorageError};
use tracing::{debug, info, warn};

/// Card whose areas live in `<dir>/<area>.img`.
///
/// Missing user and boot images are created zero filled on
/// [`ImageDevice::open`]. General purpose images only exist once the
/// host has created them.
pub struct ImageDevice {
    dir: PathBuf,
    active_boot: Option<Area>,
}

impl ImageDevice {
    pub fn open(dir: &Path, user_sectors: u32, boot_sectors: u32) -> std::io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        for (area, sectors) in [
            (Area::User, user_sectors),
            (Area::Boot1, boot_sectors),
            (Area::Boot2, boot_sectors),
        ] {
            let path = image_path(dir, area);
            if !path.exists() {
                info!(path = %path.display(), sectors = sectors, "Creating image");
                create_image(&path, sectors)?;
            }
        }
        Ok(Self {
            dir: dir.to_path_buf(),
            active_boot: None,
        })
    }

    fn file(&self, area: Area, write: bool) -> Result<File, StorageError> {
        OpenOptions::new()
            .read(true)
            .write(write)
            .open(image_path(&self.dir, area))
            .map_err(|e| {
                warn!(area = %area, error = %e, "Image unavailable");
                StorageError::Unavailable(area)
            })
    }

    fn sectors(&self, area: Area) -> Result<u32, StorageError> {
        let len = self.file(area, false)?.metadata().map_err(io_error(area))?.len();
        Ok((len / BLOCK_SIZE as u64) as u32)
    }

    /// Open `area` positioned at `start`, after a bounds check.
    fn seek(&self, area: Area, start: u32, count: u32, write: bool) -> Result<File, StorageError> {
        let size = self.sectors(area)?;
        if start.checked_add(count).is_none_or(|end| end > size) {
            return Err(StorageError::OutOfRange {
                area,
                start,
                count,
                size,
            });
        }
        let mut file = self.file(area, write)?;
        file.seek(SeekFrom::Start(start as u64 * BLOCK_SIZE as u64))
            .map_err(io_error(area))?;
        Ok(file)
    }
}

fn image_path(dir: &Path, area: Area) -> PathBuf {
    dir.join(format!("{}.img", area))
}

fn create_image(path: &Path, sectors: u32) -> std::io::Result<()> {
    let file = File::create(path)?;
    file.set_len(sectors as u64 * BLOCK_SIZE as u64)
}

fn io_error(area: Area) -> impl Fn(std::io::Error) -> StorageError {
    move |e| {
        warn!(area = %area, error = %e, "Image I/O failed");
        StorageError::Driver {
            area,
            status: DriverStatus::Unknown,
        }
    }
}

impl BlockDevice for ImageDevice {
    type Handle = Area;

    fn open(&mut self, area: Area) -> Result<Area, StorageError> {
        if !image_path(&self.dir, area).exists() {
            return Err(StorageError::Driver {
                area,
                status: DriverStatus::CardUndetected,
            });
        }
        debug!(area = %area, "Area opened");
        Ok(area)
    }

    fn read(&mut self, area: Area, start: u32, count: u32, buf: &mut [u8]) -> Result<(), StorageError> {
        let mut file = self.seek(area, start, count, false)?;
        file.read_exact(&mut buf[..count as usize * BLOCK_SIZE])
            .map_err(io_error(area))
    }

    fn write(&mut self, area: Area, start: u32, count: u32, data: &[u8]) -> Result<(), StorageError> {
        let mut file = self.seek(area, start, count, true)?;
        file.write_all(&data[..count as usize * BLOCK_SIZE])
            .map_err(io_error(area))
    }

    fn erase(&mut self, area: Area, start: u32, end: u32) -> Result<(), StorageError> {
        let count = end.saturating_sub(start) + 1;
        let mut file = self.seek(area, start, count, true)?;
        let zeros = [0u8; BLOCK_SIZE];
        for _ in 0..count {
            file.write_all(&zeros).map_err(io_error(area))?;
        }
        Ok(())
    }

    fn device_info(&mut self, area: Area) -> Result<DeviceInfo, StorageError> {
        let num_phy_partitions = Area::ALL
            .iter()
            .filter(|a| image_path(&self.dir, **a).exists())
            .count() as u8;
        Ok(DeviceInfo {
            card_size_in_sectors: self.sectors(area)?,
            block_len: BLOCK_SIZE as u32,
            num_phy_partitions,
            is_bootable: self.active_boot == Some(area),
            product_name: *b"IMGDEV",
            ..Default::default()
        })
    }

    fn set_active_boot(&mut self, area: Area) -> Result<(), StorageError> {
        info!(area = %area, "Active boot area");
        self.active_boot = Some(area);
        Ok(())
    }

    fn configure_gpp(&mut self, _area: Area, sizes: [u32; 4]) -> Result<(), StorageError> {
        for (area, sectors) in [Area::Gpp1, Area::Gpp2, Area::Gpp3, Area::Gpp4]
            .into_iter()
            .zip(sizes)
        {
            let path = image_path(&self.dir, area);
            if sectors == 0 {
                if path.exists() {
                    std::fs::remove_file(&path).map_err(io_error(area))?;
                }
                continue;
            }
            info!(area = %area, sectors = sectors, "Creating general purpose area");
            create_image(&path, sectors).map_err(io_error(area))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("emmcprg-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_open_creates_images() {
        let dir = scratch_dir("create");
        let mut dev = ImageDevice::open(&dir, 32, 8).unwrap();
        assert_eq!(dev.sectors(Area::User).unwrap(), 32);
        assert_eq!(dev.sectors(Area::Boot2).unwrap(), 8);
        assert!(matches!(
            dev.open(Area::Gpp1),
            Err(StorageError::Driver {
                status: DriverStatus::CardUndetected,
                ..
            })
        ));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_write_read_erase() {
        let dir = scratch_dir("rw");
        let mut dev = ImageDevice::open(&dir, 16, 4).unwrap();
        let h = dev.open(Area::User).unwrap();

        let data = vec![0x5A; 2 * BLOCK_SIZE];
        dev.write(h, 5, 2, &data).unwrap();
        let mut buf = vec![0; 2 * BLOCK_SIZE];
        dev.read(h, 5, 2, &mut buf).unwrap();
        assert_eq!(buf, data);

        dev.erase(h, 6, 6).unwrap();
        dev.read(h, 5, 2, &mut buf).unwrap();
        assert_eq!(&buf[..BLOCK_SIZE], &data[..BLOCK_SIZE]);
        assert_eq!(&buf[BLOCK_SIZE..], &[0u8; BLOCK_SIZE]);

        // Images survive reopening
        let mut reopened = ImageDevice::open(&dir, 16, 4).unwrap();
        reopened.read(Area::User, 5, 1, &mut buf).unwrap();
        assert_eq!(&buf[..BLOCK_SIZE], &data[..BLOCK_SIZE]);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_out_of_range() {
        let dir = scratch_dir("range");
        let mut dev = ImageDevice::open(&dir, 4, 4).unwrap();
        assert!(matches!(
            dev.write(Area::User, 3, 2, &[0; 2 * BLOCK_SIZE]),
            Err(StorageError::OutOfRange { size: 4, .. })
        ));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_configure_gpp() {
        let dir = scratch_dir("gpp");
        let mut dev = ImageDevice::open(&dir, 4, 4).unwrap();
        dev.configure_gpp(Area::User, [8, 0, 2, 0]).unwrap();
        assert_eq!(dev.sectors(Area::Gpp1).unwrap(), 8);
        assert_eq!(dev.sectors(Area::Gpp3).unwrap(), 2);
        assert!(dev.open(Area::Gpp2).is_err());

        let info = dev.device_info(Area::Gpp1).unwrap();
        assert_eq!(info.card_size_in_sectors, 8);
        assert_eq!(info.num_phy_partitions, 5);

        dev.configure_gpp(Area::User, [0; 4]).unwrap();
        assert!(dev.open(Area::Gpp1).is_err());
        std::fs::remove_dir_all(&dir).ok();
    }
}
