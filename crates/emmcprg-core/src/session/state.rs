//! Per-session protocol state.

use std::fmt;

/// Legacy open modes (`0x13` open command).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpenMode {
    Bootloader = 1,
    Bootable = 2,
    Cefs = 3,
    Factory = 4,
}

impl TryFrom<u8> for OpenMode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(OpenMode::Bootloader),
            2 => Ok(OpenMode::Bootable),
            3 => Ok(OpenMode::Cefs),
            4 => Ok(OpenMode::Factory),
            other => Err(other),
        }
    }
}

/// Image identifiers of the open multi-image command (`0x1B`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MultiImageMode {
    Pbl = 0x01,
    QcsblHdCfg = 0x02,
    Qcsbl = 0x03,
    Oemsbl = 0x04,
    Amss = 0x05,
    Apps = 0x06,
    Obl = 0x07,
    FotaUi = 0x08,
    Cefs = 0x09,
    AppsBl = 0x0A,
    AppsCefs = 0x0B,
    FlashBin = 0x0C,
    Dsp1 = 0x0D,
    Custom = 0x0E,
    Dbl = 0x0F,
    Osbl = 0x10,
    Fsbl = 0x11,
    Dsp2 = 0x12,
    Raw = 0x13,
    EmmcUser = 0x21,
    EmmcBoot0 = 0x22,
    EmmcBoot1 = 0x23,
    EmmcRpmb = 0x24,
    EmmcGpp1 = 0x25,
    EmmcGpp2 = 0x26,
    EmmcGpp3 = 0x27,
    EmmcGpp4 = 0x28,
}

impl MultiImageMode {
    const ALL: [MultiImageMode; 27] = [
        MultiImageMode::Pbl,
        MultiImageMode::QcsblHdCfg,
        MultiImageMode::Qcsbl,
        MultiImageMode::Oemsbl,
        MultiImageMode::Amss,
        MultiImageMode::Apps,
        MultiImageMode::Obl,
        MultiImageMode::FotaUi,
        MultiImageMode::Cefs,
        MultiImageMode::AppsBl,
        MultiImageMode::AppsCefs,
        MultiImageMode::FlashBin,
        MultiImageMode::Dsp1,
        MultiImageMode::Custom,
        MultiImageMode::Dbl,
        MultiImageMode::Osbl,
        MultiImageMode::Fsbl,
        MultiImageMode::Dsp2,
        MultiImageMode::Raw,
        MultiImageMode::EmmcUser,
        MultiImageMode::EmmcBoot0,
        MultiImageMode::EmmcBoot1,
        MultiImageMode::EmmcRpmb,
        MultiImageMode::EmmcGpp1,
        MultiImageMode::EmmcGpp2,
        MultiImageMode::EmmcGpp3,
        MultiImageMode::EmmcGpp4,
    ];
}

impl TryFrom<u8> for MultiImageMode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .iter()
            .copied()
            .find(|m| *m as u8 == value)
            .ok_or(value)
    }
}

/// Which open command, if any, is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActiveOpen {
    #[default]
    None,
    Legacy(OpenMode),
    MultiImage(MultiImageMode),
}

impl fmt::Display for ActiveOpen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActiveOpen::None => write!(f, "none"),
            ActiveOpen::Legacy(mode) => write!(f, "open {:?}", mode),
            ActiveOpen::MultiImage(mode) => write!(f, "open multi {:?}", mode),
        }
    }
}

/// Session flags shared by every handler.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    /// Hello accepted; gates every other command.
    pub handshake_done: bool,
    /// Active open family and mode. Only one family can be open.
    pub open: ActiveOpen,
    /// Security mode byte, once received.
    pub security_mode: Option<u8>,
    pub partition_table_received: bool,
    /// Addresses in write and read commands are sector numbers.
    pub sector_addresses: bool,
}

impl SessionState {
    pub fn new(require_partition_table: bool) -> Self {
        Self {
            partition_table_received: !require_partition_table,
            ..Default::default()
        }
    }

    pub fn is_open(&self) -> bool {
        self.open != ActiveOpen::None
    }

    pub fn close(&mut self) {
        self.open = ActiveOpen::None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_mode_conversion() {
        assert_eq!(OpenMode::try_from(4), Ok(OpenMode::Factory));
        assert_eq!(OpenMode::try_from(0), Err(0));
        assert_eq!(OpenMode::try_from(5), Err(5));
    }

    #[test]
    fn test_multi_image_conversion() {
        assert_eq!(MultiImageMode::try_from(0x11), Ok(MultiImageMode::Fsbl));
        assert_eq!(MultiImageMode::try_from(0x28), Ok(MultiImageMode::EmmcGpp4));
        assert_eq!(MultiImageMode::try_from(0x14), Err(0x14));
        assert_eq!(MultiImageMode::try_from(0x00), Err(0x00));
    }

    #[test]
    fn test_partition_table_requirement() {
        assert!(!SessionState::new(true).partition_table_received);
        assert!(SessionState::new(false).partition_table_received);
    }

    #[test]
    fn test_close_clears_open() {
        let mut state = SessionState::new(true);
        state.open = ActiveOpen::Legacy(OpenMode::Factory);
        assert!(state.is_open());
        state.close();
        assert!(!state.is_open());
    }
}
