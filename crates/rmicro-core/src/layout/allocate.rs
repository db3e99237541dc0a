//! Section allocator
//!
//! Fixed-size sections take exactly what they ask for. The bytes left over
//! are shared between weighted sections in proportion to their weight:
//!
//! ```text
//! size = floor(weight / weight_sum * remaining), rounded down to a word
//! ```
//!
//! Rounding leftovers are not redistributed; they stay unallocated at the
//! end of the space. Sections are placed back to back in input order.

use super::types::{AllocationPolicy, MemoryLayout, Region, SectionConstraint, SectionSize};
use crate::error::{Error, Result};
use std::collections::HashSet;

/// Allocate `constraints` into `available_bytes` starting at `base_address`
///
/// Zero-byte weighted sections are accepted.
pub fn allocate(
    base_address: u64,
    available_bytes: u64,
    word_size: u64,
    constraints: &[SectionConstraint],
) -> Result<MemoryLayout> {
    allocate_with_policy(
        base_address,
        available_bytes,
        word_size,
        constraints,
        AllocationPolicy::default(),
    )
}

/// Allocate `constraints` with an explicit policy for zero-byte sections
///
/// Every check runs before any address is assigned, so an error never
/// comes with a partial layout.
pub fn allocate_with_policy(
    base_address: u64,
    available_bytes: u64,
    word_size: u64,
    constraints: &[SectionConstraint],
    policy: AllocationPolicy,
) -> Result<MemoryLayout> {
    if word_size == 0 || !word_size.is_power_of_two() {
        return Err(Error::InvalidWordSize(word_size));
    }

    if base_address.checked_add(available_bytes).is_none() {
        return Err(Error::InvalidParameter(format!(
            "{} bytes from base address {:#x} overflows the address space",
            available_bytes, base_address
        )));
    }

    let mut seen = HashSet::new();
    let mut absolute_sum: u64 = 0;
    let mut weight_sum: f64 = 0.0;
    let mut first_weighted: Option<&str> = None;

    for constraint in constraints {
        if !seen.insert(constraint.name.as_str()) {
            return Err(Error::DuplicateSection(constraint.name.clone()));
        }

        match constraint.size {
            SectionSize::AbsoluteBytes(bytes) => {
                if bytes % word_size != 0 {
                    return Err(Error::MisalignedSection {
                        section: constraint.name.clone(),
                        size: bytes,
                        word_size,
                    });
                }
                absolute_sum = absolute_sum.saturating_add(bytes);
            }
            SectionSize::Weight(weight) => {
                if !weight.is_finite() || weight < 0.0 {
                    return Err(Error::InvalidWeight {
                        section: constraint.name.clone(),
                        weight,
                    });
                }
                weight_sum += weight;
                if !weight_sum.is_finite() {
                    return Err(Error::InvalidWeight {
                        section: constraint.name.clone(),
                        weight: weight_sum,
                    });
                }
                first_weighted.get_or_insert(constraint.name.as_str());
            }
        }
    }

    if absolute_sum > available_bytes {
        return Err(Error::CapacityExceeded {
            requested: absolute_sum,
            available: available_bytes,
        });
    }

    if let Some(section) = first_weighted {
        if weight_sum == 0.0 {
            return Err(Error::ZeroWeightSum {
                section: section.to_string(),
            });
        }
    }

    let remaining = available_bytes - absolute_sum;

    let mut sizes = Vec::with_capacity(constraints.len());
    for constraint in constraints {
        let size = match constraint.size {
            SectionSize::AbsoluteBytes(bytes) => bytes,
            SectionSize::Weight(weight) => {
                let share = ((weight / weight_sum) * remaining as f64).floor() as u64;
                let share = share.min(remaining);
                let size = share - share % word_size;
                if size == 0 {
                    match policy {
                        AllocationPolicy::AllowEmpty => {
                            log::warn!("section '{}' was allocated zero bytes", constraint.name)
                        }
                        AllocationPolicy::RejectEmpty => {
                            return Err(Error::ZeroSizeSection(constraint.name.clone()))
                        }
                    }
                }
                size
            }
        };
        sizes.push(size);
    }

    let total: u64 = sizes.iter().sum();
    if total > available_bytes {
        return Err(Error::CapacityExceeded {
            requested: total,
            available: available_bytes,
        });
    }

    let mut cursor = base_address;
    let sections = constraints
        .iter()
        .zip(sizes)
        .map(|(constraint, size)| {
            let region = Region {
                start: cursor,
                size,
            };
            cursor += size;
            (constraint.name.clone(), region)
        })
        .collect();

    let layout = MemoryLayout {
        base_address,
        available_bytes,
        word_size,
        sections,
    };

    log::debug!(
        "allocated {} sections: {} of {} bytes used",
        layout.len(),
        layout.allocated_bytes(),
        available_bytes
    );

    Ok(layout)
}
