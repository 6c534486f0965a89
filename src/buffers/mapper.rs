// SPDX-License-Identifier: GPL-3.0-only

//! Memory mapping of frame buffer planes
//!
//! The capture subsystem hands out buffers as sets of planes referencing
//! dmabuf-style file descriptors. Several planes may live in one descriptor;
//! each distinct descriptor is mapped exactly once, sized to the furthest
//! byte any of its planes touches.

use crate::device::types::FrameBuffer;
use crate::errors::MapError;
use memmap2::{Mmap, MmapMut, MmapOptions};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::os::fd::{AsRawFd, RawFd};
use tracing::{debug, trace};

/// Access requested for the mapped planes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MapMode {
    /// Map for reading only
    #[default]
    ReadOnly,
    /// Map for reading and writing
    ReadWrite,
}

enum MapRegion {
    Ro(Mmap),
    Rw(MmapMut),
}

impl MapRegion {
    fn as_slice(&self) -> &[u8] {
        match self {
            MapRegion::Ro(map) => map,
            MapRegion::Rw(map) => map,
        }
    }

    fn as_mut_slice(&mut self) -> Option<&mut [u8]> {
        match self {
            MapRegion::Ro(_) => None,
            MapRegion::Rw(map) => Some(map),
        }
    }

    fn len(&self) -> usize {
        self.as_slice().len()
    }
}

/// View of one plane inside a shared mapping
struct PlaneView {
    region: usize,
    offset: usize,
    length: usize,
}

/// Maps buffer descriptors into process memory
///
/// Stateless aside from logging; the returned [`MappedFrameBuffer`] owns the
/// mappings for its lifetime.
#[derive(Debug, Default)]
pub struct BufferMapper {
    mode: MapMode,
}

impl BufferMapper {
    pub fn new(mode: MapMode) -> Self {
        Self { mode }
    }

    /// Map every plane of `buffer`, validating ranges first
    ///
    /// The total size of each distinct backing handle is queried once and
    /// cached; a plane whose `offset + length` exceeds it fails with
    /// [`MapError::OutOfRange`] before anything is mapped.
    pub fn map(&self, buffer: &FrameBuffer) -> Result<MappedFrameBuffer, MapError> {
        let planes = buffer.planes();
        if planes.is_empty() {
            return Err(MapError::NoPlanes);
        }

        // Pass 1: validate every plane and compute the required mapping
        // length per distinct handle.
        let mut handles: HashMap<RawFd, HandleInfo> = HashMap::new();
        for (index, plane) in planes.iter().enumerate() {
            if plane.length == 0 {
                return Err(MapError::EmptyPlane { plane: index });
            }

            let fd = plane.handle.as_raw_fd();
            let info = match handles.entry(fd) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    let size = handle_size(fd)?;
                    entry.insert(HandleInfo { size, map_len: 0 })
                }
            };

            let end = plane
                .offset
                .checked_add(plane.length)
                .filter(|end| *end as u64 <= info.size)
                .ok_or(MapError::OutOfRange {
                    plane: index,
                    offset: plane.offset,
                    length: plane.length,
                    size: info.size,
                })?;
            info.map_len = info.map_len.max(end);
        }

        // Pass 2: map each distinct handle once, in first-touch order, and
        // record per-plane views into the shared mappings.
        let mut regions: Vec<MapRegion> = Vec::new();
        let mut region_of: HashMap<RawFd, usize> = HashMap::new();
        let mut views: Vec<PlaneView> = Vec::with_capacity(planes.len());

        for plane in planes {
            let fd = plane.handle.as_raw_fd();
            let region = match region_of.get(&fd) {
                Some(region) => *region,
                None => {
                    let map_len = handles[&fd].map_len;
                    let region = map_handle(fd, map_len, self.mode)?;
                    trace!(fd, map_len, "Mapped buffer handle");
                    regions.push(region);
                    region_of.insert(fd, regions.len() - 1);
                    regions.len() - 1
                }
            };

            views.push(PlaneView {
                region,
                offset: plane.offset,
                length: plane.length,
            });
        }

        debug!(
            planes = views.len(),
            mappings = regions.len(),
            "Mapped frame buffer"
        );

        Ok(MappedFrameBuffer { regions, views })
    }
}

struct HandleInfo {
    size: u64,
    map_len: usize,
}

/// Query the total addressable size of a backing handle
fn handle_size(fd: RawFd) -> Result<u64, MapError> {
    let size = unsafe { libc::lseek(fd, 0, libc::SEEK_END) };
    if size < 0 {
        return Err(MapError::SizeQuery(std::io::Error::last_os_error()));
    }
    Ok(size as u64)
}

fn map_handle(fd: RawFd, len: usize, mode: MapMode) -> Result<MapRegion, MapError> {
    let mut options = MmapOptions::new();
    options.len(len);
    let region = match mode {
        MapMode::ReadOnly => MapRegion::Ro(unsafe { options.map(fd) }.map_err(MapError::MapFailed)?),
        MapMode::ReadWrite => {
            MapRegion::Rw(unsafe { options.map_mut(fd) }.map_err(MapError::MapFailed)?)
        }
    };
    Ok(region)
}

/// A frame buffer with all planes mapped into process memory
///
/// Owns one mapping per distinct backing handle. Mappings are released on
/// drop, or earlier through [`unmap`](Self::unmap) when teardown ordering
/// matters; other components hold only the plane views handed out per frame.
pub struct MappedFrameBuffer {
    regions: Vec<MapRegion>,
    views: Vec<PlaneView>,
}

impl MappedFrameBuffer {
    /// Number of planes
    pub fn num_planes(&self) -> usize {
        self.views.len()
    }

    /// Number of distinct mappings backing the planes
    pub fn num_mappings(&self) -> usize {
        self.regions.len()
    }

    /// Byte view of one plane, `None` if out of range or already unmapped
    pub fn plane(&self, index: usize) -> Option<&[u8]> {
        if self.regions.is_empty() {
            return None;
        }
        let view = self.views.get(index)?;
        let region = self.regions[view.region].as_slice();
        region.get(view.offset..view.offset + view.length)
    }

    /// Mutable byte view of one plane, `None` unless mapped with
    /// [`MapMode::ReadWrite`]
    pub fn plane_mut(&mut self, index: usize) -> Option<&mut [u8]> {
        let view = self.views.get(index)?;
        let region = self.regions.get_mut(view.region)?.as_mut_slice()?;
        region.get_mut(view.offset..view.offset + view.length)
    }

    /// Views of all planes, in descriptor order
    ///
    /// Empty after [`unmap`](Self::unmap).
    pub fn planes(&self) -> Vec<&[u8]> {
        (0..self.views.len()).filter_map(|i| self.plane(i)).collect()
    }

    /// Whether the mappings are still live
    pub fn is_mapped(&self) -> bool {
        !self.regions.is_empty()
    }

    /// Release all mappings
    ///
    /// A no-op when already unmapped; dropping the buffer unmaps as well.
    pub fn unmap(&mut self) {
        if !self.regions.is_empty() {
            trace!(mappings = self.regions.len(), "Unmapping frame buffer");
            self.regions.clear();
        }
    }

    /// Total mapped length across all regions
    pub fn mapped_len(&self) -> usize {
        self.regions.iter().map(|r| r.len()).sum()
    }
}

impl std::fmt::Debug for MappedFrameBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedFrameBuffer")
            .field("planes", &self.views.len())
            .field("mappings", &self.regions.len())
            .field("mapped", &self.is_mapped())
            .finish()
    }
}
