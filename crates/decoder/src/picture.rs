//! Pictures: one image buffer plus its format, identity and lock state.
//!
//! Storage is either *managed* (checked out of the decoder's
//! [`BufferManager`] and sized automatically) or *external* (a buffer the
//! caller handed over, optionally with its own plane placement). Both kinds
//! share every other behaviour.

use lcevc_common::{
    Access, ColorFormat, DecoderError, DecoderResult, Handle, PictureDesc, PictureFlag, Timehandle,
    UserData,
};
use tracing::{error, trace, warn};

use crate::buffer_manager::{BufferManager, ManagedBuffer};
use crate::core::{CoreBitDepth, CoreImage, CoreInterleaving, CorePlane};
use crate::layout::{PictureLayout, MAX_PLANES};

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Placement of one plane inside an external buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PlaneDesc {
    /// Byte offset of the plane's first sample.
    pub offset: usize,
    pub row_byte_stride: u32,
}

/// Caller-supplied picture memory.
#[derive(Debug)]
pub struct ExternalBuffer {
    pub data: Vec<u8>,
    /// Access the caller granted. `Read` makes the picture unmodifiable.
    pub access: Access,
    /// Explicit plane placement; planes are packed back to back when absent.
    pub planes: Option<Vec<PlaneDesc>>,
}

/// Summary of a picture's backing buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BufferDesc {
    pub byte_size: usize,
    pub access: Access,
}

#[derive(Debug)]
enum Storage {
    Managed { buffer: Option<ManagedBuffer> },
    External { buffer: Option<ExternalBuffer> },
}

// ---------------------------------------------------------------------------
// Lock
// ---------------------------------------------------------------------------

/// Exclusive access token for one picture.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PictureLock {
    pub picture: Handle<Picture>,
    pub access: Access,
}

// ---------------------------------------------------------------------------
// Picture
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct Picture {
    storage: Storage,
    /// Description as last set, with uncropped dimensions.
    desc: PictureDesc,
    layout: PictureLayout,
    timehandle: Timehandle,
    user_data: UserData,
    lock: Option<Handle<PictureLock>>,
    flags: u8,
}

impl Picture {
    fn with_storage(storage: Storage) -> Self {
        Self {
            storage,
            desc: PictureDesc::default(),
            layout: PictureLayout::default(),
            timehandle: Timehandle::INVALID,
            user_data: 0,
            lock: None,
            flags: 0,
        }
    }

    /// A managed picture with no format yet.
    pub fn managed() -> Self {
        Self::with_storage(Storage::Managed { buffer: None })
    }

    /// A managed picture of the given format, with storage bound.
    ///
    /// # Errors
    ///
    /// Fails if `desc` is invalid.
    pub fn new_managed(desc: &PictureDesc, buffers: &mut BufferManager) -> DecoderResult<Self> {
        let mut picture = Self::managed();
        picture.set_desc(desc, buffers)?;
        Ok(picture)
    }

    /// An external picture over caller-supplied memory.
    ///
    /// # Errors
    ///
    /// Fails if `desc` is invalid, if plane strides are too short, or if the
    /// buffer cannot hold the described picture.
    pub fn new_external(desc: &PictureDesc, buffer: ExternalBuffer) -> DecoderResult<Self> {
        let mut picture = Self::with_storage(Storage::External { buffer: None });
        picture.bind_external(desc, buffer)?;
        Ok(picture)
    }

    pub fn is_managed(&self) -> bool {
        matches!(self.storage, Storage::Managed { .. })
    }

    // -- Identity -----------------------------------------------------------

    pub fn timehandle(&self) -> Timehandle {
        self.timehandle
    }

    pub fn set_timehandle(&mut self, timehandle: Timehandle) {
        self.timehandle = timehandle;
    }

    pub fn user_data(&self) -> UserData {
        self.user_data
    }

    pub fn set_user_data(&mut self, user_data: UserData) {
        self.user_data = user_data;
    }

    /// # Errors
    ///
    /// `InvalidParam` for [`PictureFlag::Unknown`].
    pub fn flag(&self, flag: PictureFlag) -> DecoderResult<bool> {
        let bit = flag
            .bit()
            .ok_or_else(|| DecoderError::invalid_param("unknown picture flag"))?;
        Ok(self.flags & bit != 0)
    }

    /// # Errors
    ///
    /// `InvalidParam` for [`PictureFlag::Unknown`].
    pub fn set_flag(&mut self, flag: PictureFlag, value: bool) -> DecoderResult<()> {
        let bit = flag
            .bit()
            .ok_or_else(|| DecoderError::invalid_param("unknown picture flag"))?;
        if value {
            self.flags |= bit;
        } else {
            self.flags &= !bit;
        }
        Ok(())
    }

    // -- Format -------------------------------------------------------------

    /// Current description. Width and height are post-crop.
    pub fn desc(&self) -> PictureDesc {
        PictureDesc {
            width: self.width(),
            height: self.height(),
            ..self.desc
        }
    }

    pub fn layout(&self) -> &PictureLayout {
        &self.layout
    }

    /// Visible width.
    pub fn width(&self) -> u32 {
        self.layout
            .width()
            .saturating_sub(self.desc.crop_left + self.desc.crop_right)
    }

    /// Visible height.
    pub fn height(&self) -> u32 {
        self.layout
            .height()
            .saturating_sub(self.desc.crop_top + self.desc.crop_bottom)
    }

    pub fn bit_depth(&self) -> u8 {
        self.layout.bit_depth()
    }

    pub fn plane_count(&self) -> usize {
        self.layout.plane_count()
    }

    /// Change format. Setting the current description again is a no-op.
    /// Managed pictures rebind storage for the new size; external pictures
    /// keep their buffer, which must still be large enough.
    ///
    /// # Errors
    ///
    /// Fails when the picture is locked or read-only, when the format is
    /// unknown, when the crop exceeds the picture, or when an external buffer
    /// is too small.
    pub fn set_desc(&mut self, desc: &PictureDesc, buffers: &mut BufferManager) -> DecoderResult<()> {
        if self.layout.plane_count() > 0 && self.desc == *desc {
            return Ok(());
        }
        if !self.can_modify() {
            return Err(self.unmodifiable("set desc"));
        }
        if self.is_managed() {
            self.apply_desc(desc, None)?;
            self.unbind_memory(buffers)?;
            let size = self.layout.total_size();
            if size == 0 {
                error!(th = %self.timehandle, "Binding a managed picture to no memory");
            }
            self.storage = Storage::Managed {
                buffer: Some(buffers.get_buffer(size)),
            };
            trace!(th = %self.timehandle, size, "Bound managed picture");
            return Ok(());
        }

        let buffer = match &mut self.storage {
            Storage::External { buffer } => buffer.take(),
            Storage::Managed { .. } => None,
        };
        let buffer =
            buffer.ok_or_else(|| DecoderError::error("external picture has no memory bound"))?;
        self.bind_external(desc, buffer)
    }

    /// Describe `buffer` with `desc` and store it. The buffer is kept even
    /// when the description does not fit, with the previous format restored.
    fn bind_external(&mut self, desc: &PictureDesc, buffer: ExternalBuffer) -> DecoderResult<()> {
        let previous = (self.desc, self.layout.clone());
        let result = self.describe_external(desc, &buffer);
        if result.is_err() {
            (self.desc, self.layout) = previous;
        }
        self.storage = Storage::External {
            buffer: Some(buffer),
        };
        result
    }

    fn describe_external(&mut self, desc: &PictureDesc, buffer: &ExternalBuffer) -> DecoderResult<()> {
        let strides = buffer.planes.as_ref().map(|planes| {
            planes
                .iter()
                .map(|p| p.row_byte_stride)
                .collect::<Vec<_>>()
        });
        self.apply_desc(desc, strides.as_deref())?;

        let required = match &buffer.planes {
            Some(planes) => (0..self.layout.plane_count())
                .map(|p| {
                    planes
                        .get(p)
                        .map_or(usize::MAX, |plane| plane.offset + self.layout.plane_size(p))
                })
                .max()
                .unwrap_or(0),
            None => self.layout.total_size(),
        };
        if required > buffer.data.len() {
            warn!(
                th = %self.timehandle,
                required,
                available = buffer.data.len(),
                "External buffer too small for picture"
            );
            return Err(DecoderError::error("external buffer too small for picture"));
        }
        Ok(())
    }

    fn apply_desc(&mut self, desc: &PictureDesc, strides: Option<&[u32]>) -> DecoderResult<()> {
        if desc.color_format == ColorFormat::Unknown {
            error!(th = %self.timehandle, "Invalid format, cannot set desc");
            return Err(DecoderError::invalid_param("unknown colour format"));
        }
        if !desc.crop_is_valid() {
            error!(
                th = %self.timehandle,
                crop_left = desc.crop_left,
                crop_right = desc.crop_right,
                crop_top = desc.crop_top,
                crop_bottom = desc.crop_bottom,
                width = desc.width,
                height = desc.height,
                "Requested to crop out more than the whole picture"
            );
            return Err(DecoderError::invalid_param("crop exceeds picture"));
        }
        let layout = match strides {
            Some(strides) => {
                PictureLayout::with_strides(desc.color_format, desc.width, desc.height, strides)
                    .ok_or_else(|| {
                        error!(width = desc.width, height = desc.height, "Invalid plane strides");
                        DecoderError::invalid_param("plane stride shorter than a row")
                    })?
            }
            None => PictureLayout::new(desc.color_format, desc.width, desc.height),
        };
        self.desc = *desc;
        self.layout = layout;
        Ok(())
    }

    /// Copy format and colour metadata (not pixels, not identity) from
    /// `source`.
    ///
    /// # Errors
    ///
    /// Fails if this picture cannot take the source's description.
    pub fn copy_metadata(&mut self, source: &Picture, buffers: &mut BufferManager) -> DecoderResult<()> {
        if !self.can_modify() {
            return Err(self.unmodifiable("copy metadata"));
        }
        self.set_desc(&source.desc, buffers)?;
        self.flags = source.flags;
        Ok(())
    }

    // -- Memory -------------------------------------------------------------

    /// Whether the picture's format or contents may be changed.
    pub fn can_modify(&self) -> bool {
        if self.is_locked() {
            return false;
        }
        match &self.storage {
            Storage::External { buffer: Some(b) } => b.access != Access::Read,
            _ => true,
        }
    }

    /// Whether the picture has a known format and memory behind it.
    pub fn is_valid(&self) -> bool {
        self.layout.plane_count() > 0
            && match &self.storage {
                Storage::Managed { buffer } => buffer.is_some(),
                Storage::External { buffer } => buffer.is_some(),
            }
    }

    /// Release backing memory. Managed buffers go back to `buffers`;
    /// external buffers are dropped.
    ///
    /// # Errors
    ///
    /// Fails if the picture is locked.
    pub fn unbind_memory(&mut self, buffers: &mut BufferManager) -> DecoderResult<()> {
        trace!(th = %self.timehandle, "Unbind picture memory");
        if self.is_locked() {
            error!(th = %self.timehandle, "Locked, cannot unbind memory");
            return Err(DecoderError::error("picture is locked"));
        }
        match &mut self.storage {
            Storage::Managed { buffer } => {
                if let Some(buffer) = buffer.take() {
                    buffers.release_buffer(buffer);
                }
            }
            Storage::External { buffer } => {
                *buffer = None;
            }
        }
        Ok(())
    }

    /// Hand back an external picture's memory, leaving it unbound.
    pub fn take_external_buffer(&mut self) -> Option<ExternalBuffer> {
        match &mut self.storage {
            Storage::External { buffer } if self.lock.is_none() => buffer.take(),
            _ => None,
        }
    }

    pub fn buffer_desc(&self) -> Option<BufferDesc> {
        match &self.storage {
            Storage::Managed { buffer } => buffer.as_ref().map(|b| BufferDesc {
                byte_size: b.len(),
                access: Access::Unknown,
            }),
            Storage::External { buffer } => buffer.as_ref().map(|b| BufferDesc {
                byte_size: b.data.len(),
                access: b.access,
            }),
        }
    }

    /// Placement of `plane` inside the backing buffer.
    pub fn plane_desc(&self, plane: usize) -> Option<PlaneDesc> {
        if plane >= self.layout.plane_count() {
            return None;
        }
        let explicit = match &self.storage {
            Storage::External {
                buffer: Some(ExternalBuffer {
                    planes: Some(planes),
                    ..
                }),
            } => planes.get(plane).map(|p| p.offset),
            _ => None,
        };
        Some(PlaneDesc {
            offset: explicit.unwrap_or_else(|| self.layout.plane_offset(plane)),
            row_byte_stride: self.layout.row_stride(plane),
        })
    }

    fn data(&self) -> Option<&[u8]> {
        match &self.storage {
            Storage::Managed { buffer } => buffer.as_ref().map(ManagedBuffer::data),
            Storage::External { buffer } => buffer.as_ref().map(|b| b.data.as_slice()),
        }
    }

    fn data_mut(&mut self) -> Option<&mut [u8]> {
        match &mut self.storage {
            Storage::Managed { buffer } => buffer.as_mut().map(ManagedBuffer::data_mut),
            Storage::External { buffer } => buffer.as_mut().map(|b| b.data.as_mut_slice()),
        }
    }

    fn plane_range(&self, plane: usize) -> Option<(usize, usize)> {
        let desc = self.plane_desc(plane)?;
        Some((desc.offset, self.layout.plane_size(plane)))
    }

    /// Bytes of one plane, including row padding.
    pub fn plane(&self, plane: usize) -> Option<&[u8]> {
        let (offset, len) = self.plane_range(plane)?;
        self.data()?.get(offset..offset + len)
    }

    pub fn plane_mut(&mut self, plane: usize) -> Option<&mut [u8]> {
        let (offset, len) = self.plane_range(plane)?;
        self.data_mut()?.get_mut(offset..offset + len)
    }

    /// Every plane at once, for writers that need them together.
    fn planes_mut(&mut self) -> Option<Vec<&mut [u8]>> {
        let ranges = (0..self.layout.plane_count())
            .map(|p| self.plane_range(p))
            .collect::<Option<Vec<_>>>()?;
        split_disjoint(self.data_mut()?, &ranges)
    }

    // -- Locking ------------------------------------------------------------

    pub fn is_locked(&self) -> bool {
        self.lock.is_some()
    }

    pub fn lock_handle(&self) -> Option<Handle<PictureLock>> {
        self.lock
    }

    /// Record `lock` as the picture's only lock. Fails if already locked or
    /// if `access` is `Unknown`.
    pub fn lock(&mut self, access: Access, lock: Handle<PictureLock>) -> bool {
        if self.is_locked() || access == Access::Unknown {
            return false;
        }
        self.lock = Some(lock);
        true
    }

    pub fn unlock(&mut self) -> bool {
        self.lock.take().is_some()
    }

    // -- Data ---------------------------------------------------------------

    /// Copy pixels from `source`. Identical formats are copied row by row;
    /// NV12/NV21 sources are converted into an I420 destination.
    ///
    /// # Errors
    ///
    /// Fails if this picture is unmodifiable, if either picture is invalid,
    /// if sizes differ, or if the format pair is not supported.
    pub fn copy_data(&mut self, source: &Picture) -> DecoderResult<()> {
        if !self.can_modify() {
            return Err(self.unmodifiable("copy data"));
        }
        if !self.is_valid() || !source.is_valid() {
            return Err(DecoderError::error("cannot copy between invalid pictures"));
        }
        let (src, dst) = (&source.layout, &self.layout);
        if src.width() != dst.width() || src.height() != dst.height() {
            error!(
                th = %self.timehandle,
                src_width = src.width(),
                src_height = src.height(),
                dst_width = dst.width(),
                dst_height = dst.height(),
                "Cannot copy between pictures of different sizes"
            );
            return Err(DecoderError::error("picture sizes differ"));
        }

        match (src.format(), dst.format()) {
            (ColorFormat::Nv12_8, ColorFormat::I420_8) => self.copy_semi_planar(source, false),
            (ColorFormat::Nv21_8, ColorFormat::I420_8) => self.copy_semi_planar(source, true),
            (s, d) if s == d => self.copy_planes(source),
            (s, d) => {
                error!(th = %self.timehandle, src = ?s, dst = ?d, "Cannot copy between formats");
                Err(DecoderError::error(format!("cannot copy {s:?} to {d:?}")))
            }
        }
    }

    fn copy_planes(&mut self, source: &Picture) -> DecoderResult<()> {
        let layout = self.layout.clone();
        for plane in 0..layout.plane_count() {
            let row_bytes = layout.row_bytes(plane) as usize;
            let src_stride = source.layout.row_stride(plane) as usize;
            let dst_stride = layout.row_stride(plane) as usize;
            let src = source.plane(plane).ok_or_else(missing_plane)?;
            let dst = self.plane_mut(plane).ok_or_else(missing_plane)?;
            for row in 0..layout.plane_height(plane) as usize {
                dst[row * dst_stride..row * dst_stride + row_bytes]
                    .copy_from_slice(&src[row * src_stride..row * src_stride + row_bytes]);
            }
        }
        Ok(())
    }

    fn copy_semi_planar(&mut self, source: &Picture, v_first: bool) -> DecoderResult<()> {
        let layout = self.layout.clone();
        let src_layout = &source.layout;

        let luma_bytes = layout.row_bytes(0) as usize;
        let (src_y_stride, dst_y_stride) = (
            src_layout.row_stride(0) as usize,
            layout.row_stride(0) as usize,
        );
        let src_y = source.plane(0).ok_or_else(missing_plane)?;
        let src_uv = source.plane(1).ok_or_else(missing_plane)?;
        let src_uv_stride = src_layout.row_stride(1) as usize;
        let (u_stride, v_stride) = (layout.row_stride(1) as usize, layout.row_stride(2) as usize);

        let mut planes = self.planes_mut().ok_or_else(missing_plane)?;
        let [y, u, v] = planes.as_mut_slice() else {
            return Err(missing_plane());
        };

        for row in 0..layout.plane_height(0) as usize {
            y[row * dst_y_stride..row * dst_y_stride + luma_bytes]
                .copy_from_slice(&src_y[row * src_y_stride..row * src_y_stride + luma_bytes]);
        }

        let (u, v) = if v_first { (v, u) } else { (u, v) };
        let (u_stride, v_stride) = if v_first {
            (v_stride, u_stride)
        } else {
            (u_stride, v_stride)
        };
        for row in 0..layout.plane_height(1) as usize {
            let src_row = &src_uv[row * src_uv_stride..];
            for col in 0..layout.plane_width(1) as usize {
                u[row * u_stride + col] = src_row[2 * col];
                v[row * v_stride + col] = src_row[2 * col + 1];
            }
        }
        Ok(())
    }

    /// View this picture's memory as an engine image.
    ///
    /// # Errors
    ///
    /// Fails if the picture has no memory or a format the engine cannot take.
    pub fn to_core_image(&mut self) -> DecoderResult<CoreImage<'_>> {
        let th = self.timehandle;
        let interleaving = core_interleaving(self.layout.format()).ok_or_else(|| {
            error!(th = %th, format = ?self.layout.format(), "Failed to get interleaving");
            DecoderError::error("no engine interleaving for picture format")
        })?;
        let depth = CoreBitDepth::from_bits(self.layout.bit_depth()).ok_or_else(|| {
            error!(th = %th, bits = self.layout.bit_depth(), "Failed to get bit depth");
            DecoderError::error("no engine bit depth for picture format")
        })?;

        let layout = self.layout.clone();
        let planes = self.planes_mut().ok_or_else(|| {
            error!(th = %th, "Picture has no memory bound");
            DecoderError::error("picture has no memory bound")
        })?;
        debug_assert!(planes.len() <= MAX_PLANES);
        Ok(CoreImage {
            interleaving,
            depth,
            width: layout.width(),
            height: layout.height(),
            planes: planes
                .into_iter()
                .enumerate()
                .map(|(p, data)| CorePlane {
                    data,
                    stride: layout.sample_stride(p),
                })
                .collect(),
        })
    }

    fn unmodifiable(&self, what: &str) -> DecoderError {
        error!(th = %self.timehandle, "Picture cannot be modified, cannot {what}");
        DecoderError::error(format!("picture cannot be modified, cannot {what}"))
    }
}

fn missing_plane() -> DecoderError {
    DecoderError::error("picture plane out of bounds")
}

fn core_interleaving(format: ColorFormat) -> Option<CoreInterleaving> {
    use ColorFormat::*;
    match format {
        Unknown | Nv21_8 | Rgba10_2LE => None,
        Nv12_8 => Some(CoreInterleaving::Nv12),
        Rgb8 | Bgr8 => Some(CoreInterleaving::Rgb),
        Rgba8 | Bgra8 | Argb8 | Abgr8 => Some(CoreInterleaving::Rgba),
        _ => Some(CoreInterleaving::None),
    }
}

/// Split `data` into the given `(offset, len)` ranges, which may be listed
/// in any order but must not overlap.
fn split_disjoint<'a>(data: &'a mut [u8], ranges: &[(usize, usize)]) -> Option<Vec<&'a mut [u8]>> {
    let mut order: Vec<usize> = (0..ranges.len()).collect();
    order.sort_by_key(|&i| ranges[i].0);

    let mut out: Vec<Option<&'a mut [u8]>> = (0..ranges.len()).map(|_| None).collect();
    let mut rest = data;
    let mut consumed = 0;
    for i in order {
        let (offset, len) = ranges[i];
        let skip = offset.checked_sub(consumed)?;
        if skip.checked_add(len)? > rest.len() {
            return None;
        }
        let (_, tail) = std::mem::take(&mut rest).split_at_mut(skip);
        let (plane, tail) = tail.split_at_mut(len);
        out[i] = Some(plane);
        rest = tail;
        consumed = offset + len;
    }
    out.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn i420(width: u32, height: u32) -> PictureDesc {
        PictureDesc::new(ColorFormat::I420_8, width, height)
    }

    #[test]
    fn managed_picture_binds_storage() {
        let mut buffers = BufferManager::new();
        let pic = Picture::new_managed(&i420(4, 4), &mut buffers).unwrap();
        assert!(pic.is_valid());
        assert!(pic.is_managed());
        assert_eq!(pic.buffer_desc().unwrap().byte_size, 24);
        assert_eq!(buffers.stats().busy, 1);
    }

    #[test]
    fn same_desc_is_a_no_op() {
        let mut buffers = BufferManager::new();
        let mut pic = Picture::new_managed(&i420(4, 4), &mut buffers).unwrap();
        pic.set_desc(&i420(4, 4), &mut buffers).unwrap();
        assert_eq!(buffers.stats().allocated, 1);
        assert_eq!(buffers.stats().reused, 0);
    }

    #[test]
    fn managed_resize_rebinds() {
        let mut buffers = BufferManager::new();
        let mut pic = Picture::new_managed(&i420(4, 4), &mut buffers).unwrap();
        pic.set_desc(&i420(8, 8), &mut buffers).unwrap();
        assert_eq!(pic.buffer_desc().unwrap().byte_size, 96);
        assert_eq!(buffers.stats().busy, 1);
        assert_eq!(buffers.stats().reused, 1);
    }

    #[test]
    fn invalid_descs_are_rejected() {
        let mut buffers = BufferManager::new();
        let mut pic = Picture::managed();
        let unknown = PictureDesc::new(ColorFormat::Unknown, 4, 4);
        assert!(pic.set_desc(&unknown, &mut buffers).is_err());

        let mut cropped = i420(4, 4);
        cropped.crop_top = 3;
        cropped.crop_bottom = 2;
        assert!(pic.set_desc(&cropped, &mut buffers).is_err());
        assert!(!pic.is_valid());
    }

    #[test]
    fn reported_size_is_post_crop() {
        let mut buffers = BufferManager::new();
        let mut desc = i420(16, 8);
        desc.crop_left = 2;
        desc.crop_right = 2;
        desc.crop_bottom = 4;
        let pic = Picture::new_managed(&desc, &mut buffers).unwrap();
        assert_eq!((pic.width(), pic.height()), (12, 4));
        assert_eq!(pic.desc().width, 12);
        assert_eq!(pic.desc().crop_left, 2);
    }

    #[test]
    fn locking_is_exclusive() {
        let mut pic = Picture::managed();
        let lock = Handle::from_parts(0, 1);
        assert!(!pic.lock(Access::Unknown, lock));
        assert!(pic.lock(Access::Read, lock));
        assert!(!pic.lock(Access::Read, lock));
        assert!(!pic.can_modify());
        assert!(pic.unlock());
        assert!(!pic.unlock());
        assert!(pic.can_modify());
    }

    #[test]
    fn locked_picture_cannot_change_format() {
        let mut buffers = BufferManager::new();
        let mut pic = Picture::new_managed(&i420(4, 4), &mut buffers).unwrap();
        pic.lock(Access::Write, Handle::from_parts(0, 1));
        assert!(pic.set_desc(&i420(8, 8), &mut buffers).is_err());
        assert!(pic.unbind_memory(&mut buffers).is_err());
    }

    #[test]
    fn read_only_external_is_unmodifiable() {
        let buffer = ExternalBuffer {
            data: vec![0; 24],
            access: Access::Read,
            planes: None,
        };
        let pic = Picture::new_external(&i420(4, 4), buffer).unwrap();
        assert!(pic.is_valid());
        assert!(!pic.can_modify());
    }

    #[test]
    fn external_buffer_must_be_large_enough() {
        let mut buffers = BufferManager::new();
        let buffer = ExternalBuffer {
            data: vec![0; 24],
            access: Access::Write,
            planes: None,
        };
        assert!(Picture::new_external(&i420(8, 8), buffer).is_err());

        let buffer = ExternalBuffer {
            data: vec![0; 24],
            access: Access::Write,
            planes: None,
        };
        let mut pic = Picture::new_external(&i420(4, 4), buffer).unwrap();
        assert!(pic.set_desc(&i420(8, 8), &mut buffers).is_err());
        // The failed resize leaves the old format and memory in place.
        assert!(pic.is_valid());
        assert_eq!(pic.width(), 4);
    }

    #[test]
    fn external_planes_can_be_placed_explicitly() {
        // V before U, with a padded luma stride.
        let planes = vec![
            PlaneDesc {
                offset: 0,
                row_byte_stride: 8,
            },
            PlaneDesc {
                offset: 40,
                row_byte_stride: 2,
            },
            PlaneDesc {
                offset: 32,
                row_byte_stride: 2,
            },
        ];
        let buffer = ExternalBuffer {
            data: (0..44).collect(),
            access: Access::Modify,
            planes: Some(planes),
        };
        let mut pic = Picture::new_external(&i420(4, 4), buffer).unwrap();
        assert_eq!(pic.plane(2).unwrap(), &[32, 33, 34, 35]);
        assert_eq!(pic.plane_desc(0).unwrap().row_byte_stride, 8);

        let image = pic.to_core_image().unwrap();
        assert_eq!(image.planes.len(), 3);
        assert_eq!(image.planes[1].data[0], 40);
        assert_eq!(image.planes[0].stride, 8);
    }

    #[test]
    fn copy_same_format() {
        let mut buffers = BufferManager::new();
        let mut src = Picture::new_managed(&i420(4, 2), &mut buffers).unwrap();
        for plane in 0..3 {
            src.plane_mut(plane).unwrap().fill(plane as u8 + 1);
        }
        let mut dst = Picture::new_managed(&i420(4, 2), &mut buffers).unwrap();
        dst.copy_data(&src).unwrap();
        assert_eq!(dst.plane(0).unwrap(), src.plane(0).unwrap());
        assert_eq!(dst.plane(2).unwrap(), &[3, 3]);
    }

    #[test]
    fn copy_nv12_into_i420() {
        let mut buffers = BufferManager::new();
        let mut src =
            Picture::new_managed(&PictureDesc::new(ColorFormat::Nv12_8, 2, 2), &mut buffers)
                .unwrap();
        src.plane_mut(0).unwrap().copy_from_slice(&[1, 2, 3, 4]);
        src.plane_mut(1).unwrap().copy_from_slice(&[10, 20]);

        let mut dst = Picture::new_managed(&i420(2, 2), &mut buffers).unwrap();
        dst.copy_data(&src).unwrap();
        assert_eq!(dst.plane(0).unwrap(), &[1, 2, 3, 4]);
        assert_eq!(dst.plane(1).unwrap(), &[10]);
        assert_eq!(dst.plane(2).unwrap(), &[20]);
    }

    #[test]
    fn unsupported_copy_fails() {
        let mut buffers = BufferManager::new();
        let src = Picture::new_managed(&i420(2, 2), &mut buffers).unwrap();
        let mut dst =
            Picture::new_managed(&PictureDesc::new(ColorFormat::Nv12_8, 2, 2), &mut buffers)
                .unwrap();
        assert!(dst.copy_data(&src).is_err());

        let mut bigger = Picture::new_managed(&i420(4, 4), &mut buffers).unwrap();
        assert!(bigger.copy_data(&src).is_err());
    }

    #[test]
    fn copy_metadata_takes_format_and_flags() {
        let mut buffers = BufferManager::new();
        let mut desc = PictureDesc::new(ColorFormat::I420_10LE, 8, 4);
        desc.crop_right = 2;
        let mut src = Picture::new_managed(&desc, &mut buffers).unwrap();
        src.set_flag(PictureFlag::Interlaced, true).unwrap();
        src.set_timehandle(Timehandle::new(0, 5));

        let mut dst = Picture::managed();
        dst.copy_metadata(&src, &mut buffers).unwrap();
        assert_eq!(dst.desc(), src.desc());
        assert!(dst.flag(PictureFlag::Interlaced).unwrap());
        assert!(dst.is_valid());
        assert_eq!(dst.timehandle(), Timehandle::INVALID);
    }

    #[test]
    fn unknown_flag_is_invalid_param() {
        let mut pic = Picture::managed();
        assert!(matches!(
            pic.set_flag(PictureFlag::Unknown, true),
            Err(DecoderError::InvalidParam { .. })
        ));
        pic.set_flag(PictureFlag::Idr, true).unwrap();
        assert!(pic.flag(PictureFlag::Idr).unwrap());
        assert!(!pic.flag(PictureFlag::Interlaced).unwrap());
    }

    #[test]
    fn unbind_returns_buffer_to_manager() {
        let mut buffers = BufferManager::new();
        let mut pic = Picture::new_managed(&i420(4, 4), &mut buffers).unwrap();
        pic.unbind_memory(&mut buffers).unwrap();
        assert!(!pic.is_valid());
        assert!(pic.plane(0).is_none());
        assert_eq!(buffers.stats().free, 1);
        assert_eq!(buffers.stats().busy, 0);
    }

    #[test]
    fn core_image_for_nv21_is_refused() {
        let mut buffers = BufferManager::new();
        let mut pic =
            Picture::new_managed(&PictureDesc::new(ColorFormat::Nv21_8, 2, 2), &mut buffers)
                .unwrap();
        assert!(pic.to_core_image().is_err());
    }

    #[test]
    fn overlapping_ranges_do_not_split() {
        let mut data = [0u8; 8];
        assert!(split_disjoint(&mut data, &[(0, 4), (2, 4)]).is_none());
        assert!(split_disjoint(&mut data, &[(4, 8)]).is_none());
        let parts = split_disjoint(&mut data, &[(4, 4), (0, 4)]).unwrap();
        assert_eq!(parts.len(), 2);
    }
}
