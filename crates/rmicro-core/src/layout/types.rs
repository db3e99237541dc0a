//! Memory layout types

/// How a section's size is determined
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SectionSize {
    /// A fixed number of bytes, which must be a whole number of words
    AbsoluteBytes(u64),
    /// A proportional share of the bytes left after all fixed sections
    Weight(f64),
}

/// A named section and its sizing constraint
#[derive(Debug, Clone, PartialEq)]
pub struct SectionConstraint {
    /// Section name
    pub name: String,
    /// Sizing constraint
    pub size: SectionSize,
}

impl SectionConstraint {
    /// A section of a fixed number of bytes
    pub fn bytes(name: impl Into<String>, bytes: u64) -> Self {
        Self {
            name: name.into(),
            size: SectionSize::AbsoluteBytes(bytes),
        }
    }

    /// A section sized by weight
    pub fn weight(name: impl Into<String>, weight: f64) -> Self {
        Self {
            name: name.into(),
            size: SectionSize::Weight(weight),
        }
    }
}

/// How zero-byte weighted sections are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AllocationPolicy {
    /// Accept them, logging a warning
    #[default]
    AllowEmpty,
    /// Fail the allocation
    RejectEmpty,
}

/// An allocated address range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    /// First address of the region
    pub start: u64,
    /// Size in bytes
    pub size: u64,
}

impl Region {
    /// One past the last address of the region
    pub fn end(&self) -> u64 {
        self.start + self.size
    }

    /// Check if an address is within this region
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.start && addr < self.end()
    }
}

/// Named regions carved out of a linear address space, in allocation order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryLayout {
    /// Address the first section starts at
    pub base_address: u64,
    /// Size of the address space that was partitioned
    pub available_bytes: u64,
    /// Word size every section size is a multiple of
    pub word_size: u64,
    /// Sections in allocation order
    pub sections: Vec<(String, Region)>,
}

impl MemoryLayout {
    /// Find a section's region by name
    pub fn get(&self, name: &str) -> Option<&Region> {
        self.sections
            .iter()
            .find(|(section, _)| section == name)
            .map(|(_, region)| region)
    }

    /// Iterate over sections in allocation order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Region)> {
        self.sections.iter().map(|(name, region)| (name.as_str(), region))
    }

    /// Get the number of sections
    pub fn len(&self) -> usize {
        self.sections.len()
    }

    /// Check if the layout has no sections
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Total bytes allocated to sections
    pub fn allocated_bytes(&self) -> u64 {
        self.sections.iter().map(|(_, r)| r.size).sum()
    }

    /// Bytes left unallocated at the end of the space
    pub fn unallocated_bytes(&self) -> u64 {
        self.available_bytes - self.allocated_bytes()
    }
}
