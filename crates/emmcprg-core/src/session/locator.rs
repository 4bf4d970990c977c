//! Legacy partition table search.
//!
//! Walks the master boot record and, through its fourth entry, the chain
//! of extended boot records to find the first partition of a given type.

use byteorder::{ByteOrder, LittleEndian};
use tracing::{debug, trace};

use crate::protocol::constants::*;
use crate::storage::BlockDevice;

/// Start sector reported by the driver-level API when nothing matches.
/// [`locate_partition`] maps it to `None`.
pub const LOCATE_FAIL: u32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Entry {
    kind: u8,
    start: u32,
}

fn entry(sector: &[u8; BLOCK_SIZE], index: usize) -> Entry {
    let base = MBR_ENTRY_OFFSETS[index];
    Entry {
        kind: sector[base + MBR_ENTRY_TYPE],
        start: LittleEndian::read_u32(&sector[base + MBR_ENTRY_START..base + MBR_ENTRY_START + 4]),
    }
}

fn read_sector<D: BlockDevice>(
    device: &mut D,
    handle: D::Handle,
    sector: u32,
    buf: &mut [u8; BLOCK_SIZE],
) -> Option<()> {
    match device.read(handle, sector, 1, buf) {
        Ok(()) => Some(()),
        Err(e) => {
            debug!(sector = sector, error = %e, "Partition table read failed");
            None
        }
    }
}

/// Find the start sector of the first partition of type `wanted`.
///
/// Primary entries are checked first. If none match and the fourth is an
/// extended partition, its chain is followed: each link's first entry is
/// relative to the chain base plus the link offset, and its second entry
/// gives the next link while it is still marked extended.
///
/// Returns `None` on no match, a broken chain, a read error or a result
/// of [`LOCATE_FAIL`].
pub fn locate_partition<D: BlockDevice>(
    device: &mut D,
    handle: D::Handle,
    wanted: u8,
) -> Option<u32> {
    let mut sector = [0u8; BLOCK_SIZE];
    read_sector(device, handle, 0, &mut sector)?;

    let primary: [Entry; 4] = std::array::from_fn(|i| entry(&sector, i));
    if let Some(e) = primary.iter().find(|e| e.kind == wanted) {
        trace!(kind = wanted, start = e.start, "Found primary partition");
        return found(e.start);
    }

    let extended = primary[3];
    if extended.kind != PARTITION_TYPE_EXTENDED {
        return None;
    }

    let base = extended.start;
    let mut next = 0u32;
    for _ in 0..MAX_EBR_CHAIN {
        let link = base.checked_add(next)?;
        read_sector(device, handle, link, &mut sector)?;

        let logical = entry(&sector, 0);
        if logical.kind == wanted {
            let start = logical.start.wrapping_add(link);
            trace!(kind = wanted, start = start, ebr = link, "Found logical partition");
            return found(start);
        }

        let chain = entry(&sector, 1);
        if chain.kind != PARTITION_TYPE_EXTENDED {
            return None;
        }
        next = chain.start;
    }
    debug!(base = base, "Extended partition chain too long");
    None
}

fn found(start: u32) -> Option<u32> {
    (start != LOCATE_FAIL).then_some(start)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Area, DriverStatus, MemoryDevice, OpKind};

    fn table(entries: &[(u8, u32)]) -> [u8; BLOCK_SIZE] {
        let mut sector = [0u8; BLOCK_SIZE];
        for (i, &(kind, start)) in entries.iter().enumerate() {
            let base = MBR_ENTRY_OFFSETS[i];
            sector[base + MBR_ENTRY_TYPE] = kind;
            sector[base + MBR_ENTRY_START..base + MBR_ENTRY_START + 4]
                .copy_from_slice(&start.to_le_bytes());
        }
        sector[510] = 0x55;
        sector[511] = 0xAA;
        sector
    }

    fn device_with_chain() -> MemoryDevice {
        let dev = MemoryDevice::new(1024, 4);
        dev.preload(
            Area::User,
            0,
            &table(&[(0x06, 100), (0x05, 500), (0x00, 0), (0x05, 500)]),
        );
        dev.preload(Area::User, 500, &table(&[(0x0B, 10), (0x05, 20)]));
        dev.preload(Area::User, 520, &table(&[(0x0C, 5), (0x00, 0)]));
        dev
    }

    #[test]
    fn test_primary_match() {
        let mut dev = device_with_chain();
        assert_eq!(locate_partition(&mut dev, Area::User, 0x06), Some(100));
    }

    #[test]
    fn test_first_link_is_relative_to_chain_base() {
        let mut dev = device_with_chain();
        // 500 (chain base) + 0 (first link) + 10 (relative start)
        assert_eq!(locate_partition(&mut dev, Area::User, 0x0B), Some(510));
    }

    #[test]
    fn test_second_link() {
        let mut dev = device_with_chain();
        // Link at 500 + 20, entry relative start 5
        assert_eq!(locate_partition(&mut dev, Area::User, 0x0C), Some(525));
    }

    #[test]
    fn test_absent_type() {
        let mut dev = device_with_chain();
        assert_eq!(locate_partition(&mut dev, Area::User, 0x83), None);
    }

    #[test]
    fn test_fourth_entry_not_extended() {
        let mut dev = MemoryDevice::new(64, 4);
        dev.preload(Area::User, 0, &table(&[(0x06, 1), (0x05, 8), (0, 0), (0x83, 9)]));
        assert_eq!(locate_partition(&mut dev, Area::User, 0x0B), None);
    }

    #[test]
    fn test_read_error() {
        let mut dev = device_with_chain();
        dev.fail(OpKind::Read, None, DriverStatus::DataCrcFail);
        assert_eq!(locate_partition(&mut dev, Area::User, 0x06), None);
    }

    #[test]
    fn test_self_referencing_chain_terminates() {
        let mut dev = MemoryDevice::new(64, 4);
        dev.preload(Area::User, 0, &table(&[(0, 0), (0, 0), (0, 0), (0x05, 8)]));
        dev.preload(Area::User, 8, &table(&[(0x83, 1), (0x05, 0)]));
        assert_eq!(locate_partition(&mut dev, Area::User, 0x0B), None);
    }
}
