//! Sector descriptors and the cached erase / protection state of each sector.

/// Cached knowledge about whether a sector is blank.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EraseState {
    /// Nothing is known about the sector's contents.
    Unknown,
    /// The sector holds data.
    Dirty,
    /// The sector was erased, and nothing has been written to it since.
    Erased,
}

impl EraseState {
    /// Only a sector known to be blank can be written without erasing first.
    pub fn needs_erase(self) -> bool {
        self != EraseState::Erased
    }
}

/// Cached knowledge about a sector's write protection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProtectionState {
    Unknown,
    Unprotected,
    Protected,
}

/// A single erasable unit of a flash bank.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Sector {
    /// Offset of the sector from the start of its bank.
    pub offset: u32,
    /// Size of the sector, in bytes.
    pub size: u32,
    pub erase: EraseState,
    pub protection: ProtectionState,
}

impl Sector {
    /// Create a sector with nothing known about its state.
    pub fn new(offset: u32, size: u32) -> Sector {
        Sector {
            offset,
            size,
            erase: EraseState::Unknown,
            protection: ProtectionState::Unknown,
        }
    }

    /// Check whether the (bank-relative) `addr` falls within this sector.
    pub fn contains(&self, addr: u32) -> bool {
        self.offset <= addr && addr - self.offset < self.size
    }

    pub fn is_protected(&self) -> bool {
        self.protection == ProtectionState::Protected
    }
}

/// Build a table of `count` sectors of `size` bytes each.
pub fn uniform_sectors(count: u32, size: u32) -> impl Iterator<Item = Sector> {
    (0..count).map(move |i| Sector::new(i * size, size))
}

/// Find the sector containing the (bank-relative) `addr`.
pub fn find_sector_by_address(sectors: &mut [Sector], addr: u32) -> Option<&mut Sector> {
    sectors.iter_mut().find(|s| s.contains(addr))
}
