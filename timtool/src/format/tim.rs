// SPDX-FileCopyrightText: 2025 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

//! Parser for the Trusted Image Metadata (TIM) container found at the start of
//! flash images for boot ROMs that load their next stages from SPI NOR.
//!
//! A flash image begins with a primary `TIMH` header. If the header's trusted
//! flag is set, a secondary `TIMN` header follows at [`SECONDARY_HEADER_OFFSET`].
//! Each header is followed by a table of image descriptors that point at the
//! payloads elsewhere in the flash image. The payload offsets are always
//! absolute, regardless of which header the descriptor belongs to.

use std::{fmt, mem, str::FromStr};

use thiserror::Error;
use tracing::{debug, trace, warn};
use zerocopy::{FromBytes, byteorder::little_endian};
use zerocopy_derive::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::util::NumBytes;

/// Magic value for [`TimHeader::identifier`] of the primary header.
pub const TIMH_MAGIC: ImageId = ImageId::from_name(b"TIMH");
/// Magic value for [`TimHeader::identifier`] of the secondary header.
pub const TIMN_MAGIC: ImageId = ImageId::from_name(b"TIMN");

/// Minimum supported header version (3.6.0).
pub const MIN_VERSION: u32 = 0x0003_0600;

/// Size of the header preamble. The image descriptor table starts right after.
pub const HEADER_SIZE: usize = 56;

/// Distance between consecutive image descriptors. Only the first
/// [`DESCRIPTOR_SIZE`] bytes of each record are parsed. The rest holds hash and
/// encryption parameters.
pub const DESCRIPTOR_STRIDE: usize = 108;

/// Number of bytes of each descriptor record that are parsed.
pub const DESCRIPTOR_SIZE: usize = mem::size_of::<RawImageDescriptor>();

/// Absolute offset of the secondary header in a trusted flash image.
pub const SECONDARY_HEADER_OFFSET: usize = 0x1000;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Header at {offset:#x}: Invalid magic: {magic:?}")]
    InvalidMagic { offset: usize, magic: ImageId },
    #[error("Header at {offset:#x}: Unsupported version: {version:#010x} < {MIN_VERSION:#010x}")]
    UnsupportedVersion { offset: usize, version: u32 },
    #[error("Header at {offset:#x}: Image table is empty")]
    EmptyImageTable { offset: usize },
    #[error("Truncated {what} at {offset:#x}: Need {needed} bytes, but only {available} available")]
    Truncated {
        what: &'static str,
        offset: usize,
        needed: usize,
        available: usize,
    },
    #[error(
        "Image #{index} ({id:?}): Payload at {flash_entry:#x} with size {size:#x} exceeds flash image size {blob_len:#x}"
    )]
    PayloadOutOfRange {
        index: usize,
        id: ImageId,
        flash_entry: u32,
        size: u32,
        blob_len: usize,
    },
    #[error("Invalid image name: {0:?}")]
    InvalidImageName(String),
}

type Result<T> = std::result::Result<T, Error>;

/// Format a header version as `<major>.<minor>.<patch>`.
pub fn version_string(version: u32) -> String {
    format!(
        "{}.{}.{}",
        version >> 16,
        (version >> 8) & 0xff,
        version & 0xff,
    )
}

/// A four character tag identifying a header or an image type. The most
/// significant byte is the first character.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ImageId(pub u32);

impl ImageId {
    pub const fn from_name(name: &[u8; 4]) -> Self {
        Self(u32::from_be_bytes(*name))
    }

    pub const fn to_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    /// Render the tag as four characters. Each byte maps to the character with
    /// the same code point, so non-ASCII and non-printable values are kept
    /// as-is.
    pub fn name(self) -> String {
        self.to_bytes().iter().map(|b| char::from(*b)).collect()
    }
}

impl fmt::Debug for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({:#010x})", self.name(), self.0)
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl FromStr for ImageId {
    type Err = Error;

    /// Parse either a four character name or a `0x`-prefixed hex value. Four
    /// character inputs are always names, even if they begin with `0x`.
    fn from_str(s: &str) -> Result<Self> {
        if let Some(hex) = s.strip_prefix("0x").filter(|_| s.chars().count() > 4) {
            return u32::from_str_radix(hex, 16)
                .map(Self)
                .map_err(|_| Error::InvalidImageName(s.to_owned()));
        }

        let bytes = s
            .chars()
            .map(|c| u8::try_from(c).ok())
            .collect::<Option<Vec<_>>>()
            .and_then(|b| <[u8; 4]>::try_from(b).ok())
            .ok_or_else(|| Error::InvalidImageName(s.to_owned()))?;

        Ok(Self::from_name(&bytes))
    }
}

/// Raw on-disk layout for the part of the header preamble that must be
/// present.
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C, packed)]
struct RawHeader {
    /// Format version. Must be at least [`MIN_VERSION`].
    version: little_endian::U32,
    /// Either [`TIMH_MAGIC`] or [`TIMN_MAGIC`].
    identifier: little_endian::U32,
    /// Non-zero if a secondary header exists.
    trusted: little_endian::U32,
    issue_date: little_endian::U32,
    oem_unique_id: little_endian::U32,
    _reserved: [little_endian::U32; 5],
    /// Boot device the image was built for.
    boot_flash_signature: little_endian::U32,
    /// Number of entries in the image descriptor table.
    num_images: little_endian::U32,
}

/// Raw on-disk layout for the remainder of the header preamble.
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C, packed)]
struct RawHeaderTail {
    num_keys: little_endian::U32,
    reserved_size: little_endian::U32,
}

const _: () =
    assert!(mem::size_of::<RawHeader>() + mem::size_of::<RawHeaderTail>() == HEADER_SIZE);

/// Raw on-disk layout for the parsed prefix of an image descriptor record.
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C, packed)]
struct RawImageDescriptor {
    id: little_endian::U32,
    next_id: little_endian::U32,
    flash_entry: little_endian::U32,
    load_addr: little_endian::U32,
    size: little_endian::U32,
}

const _: () = assert!(mem::size_of::<RawImageDescriptor>() < DESCRIPTOR_STRIDE);

/// Read a `T` from `blob` at `offset` without going out of bounds.
fn read_at<T: FromBytes>(blob: &[u8], offset: usize, what: &'static str) -> Result<T> {
    blob.get(offset..)
        .and_then(|b| T::read_from_prefix(b).ok())
        .map(|(value, _)| value)
        .ok_or(Error::Truncated {
            what,
            offset,
            needed: mem::size_of::<T>(),
            available: blob.len().saturating_sub(offset),
        })
}

/// A validated TIM header. The only way to obtain one is [`decode_header`], so
/// the magic, version, and image count checks always hold.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct TimHeader {
    version: u32,
    identifier: ImageId,
    trusted: u32,
    issue_date: u32,
    oem_unique_id: u32,
    boot_flash_signature: u32,
    num_images: u32,
    num_keys: Option<u32>,
    reserved_size: Option<u32>,
}

impl fmt::Debug for TimHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimHeader")
            .field(
                "version",
                &format_args!("{} ({:#010x})", version_string(self.version), self.version),
            )
            .field("identifier", &self.identifier)
            .field("trusted", &self.trusted)
            .field("issue_date", &format_args!("{:#010x}", self.issue_date))
            .field("oem_unique_id", &format_args!("{:#010x}", self.oem_unique_id))
            .field(
                "boot_flash_signature",
                &ImageId(self.boot_flash_signature),
            )
            .field("num_images", &self.num_images)
            .field("num_keys", &self.num_keys)
            .field("reserved_size", &self.reserved_size)
            .finish()
    }
}

impl TimHeader {
    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn identifier(&self) -> ImageId {
        self.identifier
    }

    pub fn trusted(&self) -> u32 {
        self.trusted
    }

    /// Whether a secondary header follows at [`SECONDARY_HEADER_OFFSET`].
    pub fn is_trusted(&self) -> bool {
        self.trusted != 0
    }

    pub fn issue_date(&self) -> u32 {
        self.issue_date
    }

    pub fn oem_unique_id(&self) -> u32 {
        self.oem_unique_id
    }

    pub fn boot_flash_signature(&self) -> u32 {
        self.boot_flash_signature
    }

    pub fn num_images(&self) -> u32 {
        self.num_images
    }

    /// Number of key records. [`None`] if the flash image ends before this
    /// field.
    pub fn num_keys(&self) -> Option<u32> {
        self.num_keys
    }

    /// Size of the reserved area. [`None`] if the flash image ends before this
    /// field.
    pub fn reserved_size(&self) -> Option<u32> {
        self.reserved_size
    }
}

/// Decode and validate the TIM header at `base_offset`.
pub fn decode_header(blob: &[u8], base_offset: usize) -> Result<TimHeader> {
    let raw: RawHeader = read_at(blob, base_offset, "header")?;

    let identifier = ImageId(raw.identifier.get());
    if identifier != TIMH_MAGIC && identifier != TIMN_MAGIC {
        return Err(Error::InvalidMagic {
            offset: base_offset,
            magic: identifier,
        });
    }

    let version = raw.version.get();
    if version < MIN_VERSION {
        return Err(Error::UnsupportedVersion {
            offset: base_offset,
            version,
        });
    }

    let num_images = raw.num_images.get();
    if num_images == 0 {
        return Err(Error::EmptyImageTable {
            offset: base_offset,
        });
    }

    let tail = base_offset
        .checked_add(mem::size_of::<RawHeader>())
        .and_then(|o| read_at::<RawHeaderTail>(blob, o, "header").ok());

    let header = TimHeader {
        version,
        identifier,
        trusted: raw.trusted.get(),
        issue_date: raw.issue_date.get(),
        oem_unique_id: raw.oem_unique_id.get(),
        boot_flash_signature: raw.boot_flash_signature.get(),
        num_images,
        num_keys: tail.map(|t| t.num_keys.get()),
        reserved_size: tail.map(|t| t.reserved_size.get()),
    };

    debug!("Header at {base_offset:#x}: {header:?}");

    Ok(header)
}

/// The parsed prefix of an image descriptor record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageDescriptor {
    pub id: ImageId,
    /// Type of the next image. Not followed when walking the table.
    pub next_id: ImageId,
    /// Absolute offset of the payload in the flash image.
    pub flash_entry: u32,
    pub load_addr: u32,
    pub size: u32,
}

impl From<RawImageDescriptor> for ImageDescriptor {
    fn from(raw: RawImageDescriptor) -> Self {
        Self {
            id: ImageId(raw.id.get()),
            next_id: ImageId(raw.next_id.get()),
            flash_entry: raw.flash_entry.get(),
            load_addr: raw.load_addr.get(),
            size: raw.size.get(),
        }
    }
}

/// A sub-image located through a descriptor. The payload borrows from the
/// flash image.
#[derive(Clone, PartialEq, Eq)]
pub struct ExtractedImage<'a> {
    pub name: String,
    pub flash_entry: u32,
    pub data: &'a [u8],
    pub descriptor: ImageDescriptor,
}

impl fmt::Debug for ExtractedImage<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractedImage")
            .field("name", &self.name)
            .field("flash_entry", &format_args!("{:#x}", self.flash_entry))
            .field("data", &NumBytes(self.data.len()))
            .field("descriptor", &self.descriptor)
            .finish()
    }
}

/// Offset of descriptor record `index` for a header at `base_offset`.
fn descriptor_offset(base_offset: usize, index: usize) -> Option<usize> {
    index
        .checked_mul(DESCRIPTOR_STRIDE)?
        .checked_add(HEADER_SIZE)?
        .checked_add(base_offset)
}

/// Walk the image descriptor table of the header at `base_offset` and slice out
/// each payload. Only the first [`DESCRIPTOR_SIZE`] bytes of every record are
/// read, so the last record does not need to be complete.
pub fn extract_images<'a>(
    blob: &'a [u8],
    header: &TimHeader,
    base_offset: usize,
) -> Result<Vec<ExtractedImage<'a>>> {
    let mut result = vec![];

    for index in 0..header.num_images as usize {
        // An offset past the address space can never be backed by the blob.
        let offset = descriptor_offset(base_offset, index).ok_or(Error::Truncated {
            what: "image descriptor",
            offset: usize::MAX,
            needed: DESCRIPTOR_SIZE,
            available: 0,
        })?;
        let raw: RawImageDescriptor = read_at(blob, offset, "image descriptor")?;
        let descriptor = ImageDescriptor::from(raw);

        trace!("Image #{index} at {offset:#x}: {descriptor:?}");

        let start = descriptor.flash_entry as usize;
        let data = start
            .checked_add(descriptor.size as usize)
            .and_then(|end| blob.get(start..end))
            .ok_or(Error::PayloadOutOfRange {
                index,
                id: descriptor.id,
                flash_entry: descriptor.flash_entry,
                size: descriptor.size,
                blob_len: blob.len(),
            })?;

        result.push(ExtractedImage {
            name: descriptor.id.name(),
            flash_entry: descriptor.flash_entry,
            data,
            descriptor,
        });
    }

    Ok(result)
}

/// A decoded header along with the images from its descriptor table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tim<'a> {
    /// Absolute offset of the header in the flash image.
    pub offset: usize,
    pub header: TimHeader,
    pub images: Vec<ExtractedImage<'a>>,
}

impl<'a> Tim<'a> {
    pub fn parse(blob: &'a [u8], offset: usize) -> Result<Self> {
        let header = decode_header(blob, offset)?;
        let images = extract_images(blob, &header, offset)?;

        Ok(Self {
            offset,
            header,
            images,
        })
    }
}

/// All TIM headers in a flash image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlashImage<'a> {
    pub primary: Tim<'a>,
    pub secondary: Option<Tim<'a>>,
}

impl<'a> FlashImage<'a> {
    /// Parse the primary header and, for trusted images, the secondary header.
    /// Any error in either header fails the whole parse.
    pub fn parse(blob: &'a [u8]) -> Result<Self> {
        let primary = Tim::parse(blob, 0)?;
        if primary.header.identifier != TIMH_MAGIC {
            warn!("Primary header has identifier {:?}", primary.header.identifier);
        }

        let secondary = if primary.header.is_trusted() {
            let secondary = Tim::parse(blob, SECONDARY_HEADER_OFFSET)?;
            if secondary.header.identifier != TIMN_MAGIC {
                warn!(
                    "Secondary header has identifier {:?}",
                    secondary.header.identifier,
                );
            }

            Some(secondary)
        } else {
            None
        };

        Ok(Self { primary, secondary })
    }

    /// Iterate through the primary header's images, followed by the secondary
    /// header's images.
    pub fn images(&self) -> impl Iterator<Item = &ExtractedImage<'a>> {
        self.primary
            .images
            .iter()
            .chain(self.secondary.iter().flat_map(|t| t.images.iter()))
    }

    /// Find the first image with the specified type.
    pub fn find_image(&self, id: ImageId) -> Option<&ExtractedImage<'a>> {
        self.images().find(|i| i.descriptor.id == id)
    }

    pub fn into_images(self) -> Vec<ExtractedImage<'a>> {
        let mut result = self.primary.images;
        if let Some(secondary) = self.secondary {
            result.extend(secondary.images);
        }

        result
    }
}

/// Get all images referenced by the flash image's TIM headers in on-disk order.
pub fn get_flash_image_parts(blob: &[u8]) -> Result<Vec<ExtractedImage<'_>>> {
    FlashImage::parse(blob).map(FlashImage::into_images)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_id_name() {
        assert_eq!(TIMH_MAGIC.0, 0x54494d48);
        assert_eq!(TIMN_MAGIC.0, 0x54494d4e);
        assert_eq!(TIMH_MAGIC.name(), "TIMH");
        assert_eq!(ImageId(0x00ff7f41).name(), "\u{0}\u{ff}\u{7f}A");
    }

    #[test]
    fn image_id_from_str() {
        assert_eq!("BOOT".parse::<ImageId>().unwrap(), ImageId(0x424f4f54));
        assert_eq!("0x424f4f54".parse::<ImageId>().unwrap(), ImageId(0x424f4f54));
        assert_eq!("\u{ff}\u{0}AB".parse::<ImageId>().unwrap(), ImageId(0xff004142));
        assert_eq!("0x12".parse::<ImageId>().unwrap(), ImageId::from_name(b"0x12"));
        assert_eq!("0x1".parse::<ImageId>().unwrap_err().to_string(), "Invalid image name: \"0x1\"");
        assert_eq!("0x001".parse::<ImageId>().unwrap(), ImageId(1));
        assert!("BOO".parse::<ImageId>().is_err());
        assert!("BOOTS".parse::<ImageId>().is_err());
        assert!("\u{100}OOT".parse::<ImageId>().is_err());
        assert!("0xzz".parse::<ImageId>().is_err());
    }

    #[test]
    fn version_formatting() {
        assert_eq!(version_string(MIN_VERSION), "3.6.0");
        assert_eq!(version_string(0x0003_0601), "3.6.1");
        assert_eq!(version_string(0x0104_ff02), "260.255.2");
    }

    #[test]
    fn descriptor_offsets() {
        assert_eq!(descriptor_offset(0, 0), Some(56));
        assert_eq!(descriptor_offset(0, 2), Some(56 + 216));
        assert_eq!(descriptor_offset(0x1000, 1), Some(0x1000 + 56 + 108));
        assert_eq!(descriptor_offset(usize::MAX - 10, 0), None);
        assert_eq!(descriptor_offset(0, usize::MAX), None);
    }
}
