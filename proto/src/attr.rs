//! fattr4 attribute codec.
//!
//! A `fattr4` is a `bitmap4` attribute mask followed by an opaque blob in
//! which the attribute values are packed back to back, in ascending
//! attribute-number order. The codec walks the bitmap bits in order for
//! both directions, so the blob layout falls out of the mask itself.

use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::{FromPrimitive, ToPrimitive};

use crate::nfs4_proto::{
    Fsid4, NfsFtype4, NfsStat4, Nfsace4, Nfstime4, Settime4, Specdata4, NFS4_OPAQUE_LIMIT,
};
use crate::xdr::{XdrDecode, XdrEncode, XdrError, XdrReader, XdrResult, XdrWriter};

/// Decoder cap for ACE arrays inside the acl attribute.
pub const MAX_ACL_ENTRIES: usize = 128;

/// File attribute numbers from RFC 7531 section 5.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum FileAttr {
    SupportedAttrs = 0,
    Type = 1,
    FhExpireType = 2,
    Change = 3,
    Size = 4,
    LinkSupport = 5,
    SymlinkSupport = 6,
    NamedAttr = 7,
    Fsid = 8,
    UniqueHandles = 9,
    LeaseTime = 10,
    RdattrError = 11,
    Acl = 12,
    AclSupport = 13,
    Archive = 14,
    Cansettime = 15,
    CaseInsensitive = 16,
    CasePreserving = 17,
    ChownRestricted = 18,
    Filehandle = 19,
    Fileid = 20,
    FilesAvail = 21,
    FilesFree = 22,
    FilesTotal = 23,
    FsLocations = 24,
    Hidden = 25,
    Homogeneous = 26,
    Maxfilesize = 27,
    Maxlink = 28,
    Maxname = 29,
    Maxread = 30,
    Maxwrite = 31,
    Mimetype = 32,
    Mode = 33,
    NoTrunc = 34,
    Numlinks = 35,
    Owner = 36,
    OwnerGroup = 37,
    QuotaAvailHard = 38,
    QuotaAvailSoft = 39,
    QuotaUsed = 40,
    Rawdev = 41,
    SpaceAvail = 42,
    SpaceFree = 43,
    SpaceTotal = 44,
    SpaceUsed = 45,
    System = 46,
    TimeAccess = 47,
    TimeAccessSet = 48,
    TimeBackup = 49,
    TimeCreate = 50,
    TimeDelta = 51,
    TimeMetadata = 52,
    TimeModify = 53,
    TimeModifySet = 54,
    MountedOnFileid = 55,
}

/// An ordered attribute list with the `bitmap4` wire representation.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FileAttrList(pub Vec<FileAttr>);

impl FileAttrList {
    pub fn new(attrs: Vec<FileAttr>) -> Self {
        let mut list = FileAttrList(attrs);
        list.0.sort();
        list.0.dedup();
        list
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, attr: FileAttr) -> bool {
        self.0.contains(&attr)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FileAttr> {
        self.0.iter()
    }

    /// The bits present in both this list and `supported`, in ascending
    /// order. Unsupported bits are silently dropped, as the response
    /// bitmap advertises only what the server actually returned.
    pub fn intersect(&self, supported: &FileAttrList) -> FileAttrList {
        FileAttrList::new(
            self.0
                .iter()
                .copied()
                .filter(|attr| supported.contains(*attr))
                .collect(),
        )
    }

    pub fn to_bitmap(&self) -> Vec<u32> {
        attrs_to_bitmap(&self.0)
    }
}

impl From<Vec<FileAttr>> for FileAttrList {
    fn from(attrs: Vec<FileAttr>) -> Self {
        FileAttrList::new(attrs)
    }
}

impl XdrEncode for FileAttrList {
    fn encode(&self, writer: &mut XdrWriter) {
        writer.write_bitmap(&self.to_bitmap());
    }
}

impl XdrDecode for FileAttrList {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        let words = reader.read_bitmap()?;
        Ok(FileAttrList::new(bitmap_to_attrs(&words)))
    }
}

/// Packs attribute numbers into `bitmap4` words.
pub fn attrs_to_bitmap(attrs: &[FileAttr]) -> Vec<u32> {
    let mut words: Vec<u32> = Vec::new();
    for attr in attrs {
        let idx = ToPrimitive::to_u32(attr).unwrap() as usize;
        let word = idx / 32;
        if words.len() <= word {
            words.resize(word + 1, 0);
        }
        words[word] |= 1 << (idx % 32);
    }
    words
}

/// Expands `bitmap4` words into attribute numbers, ascending. Bits with
/// no assigned attribute are dropped.
pub fn bitmap_to_attrs(words: &[u32]) -> Vec<FileAttr> {
    let mut attrs = Vec::new();
    for (idx, word) in words.iter().enumerate() {
        for bit in 0..32 {
            if (word >> bit) & 1 == 1 {
                if let Some(attr) = FromPrimitive::from_u32((idx * 32 + bit) as u32) {
                    attrs.push(attr);
                }
            }
        }
    }
    attrs
}

/// Like [`bitmap_to_attrs`] but refuses unknown bits, for the decode
/// paths (SETATTR, VERIFY) where a value blob follows the mask and an
/// unknown bit would desynchronize it.
fn bitmap_to_attrs_strict(words: &[u32]) -> XdrResult<Vec<FileAttr>> {
    let mut attrs = Vec::new();
    for (idx, word) in words.iter().enumerate() {
        for bit in 0..32 {
            if (word >> bit) & 1 == 1 {
                let number = (idx * 32 + bit) as u32;
                match FromPrimitive::from_u32(number) {
                    Some(attr) => attrs.push(attr),
                    None => return Err(XdrError::UnsupportedAttribute(number)),
                }
            }
        }
    }
    Ok(attrs)
}

/// A single decoded attribute value.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FileAttrValue {
    SupportedAttrs(FileAttrList),
    Type(NfsFtype4),
    FhExpireType(u32),
    Change(u64),
    Size(u64),
    LinkSupport(bool),
    SymlinkSupport(bool),
    NamedAttr(bool),
    Fsid(Fsid4),
    UniqueHandles(bool),
    LeaseTime(u32),
    RdattrError(NfsStat4),
    Acl(Vec<Nfsace4>),
    AclSupport(u32),
    Archive(bool),
    Cansettime(bool),
    CaseInsensitive(bool),
    CasePreserving(bool),
    ChownRestricted(bool),
    Filehandle(Vec<u8>),
    Fileid(u64),
    FilesAvail(u64),
    FilesFree(u64),
    FilesTotal(u64),
    Hidden(bool),
    Homogeneous(bool),
    Maxfilesize(u64),
    Maxlink(u32),
    Maxname(u32),
    Maxread(u64),
    Maxwrite(u64),
    Mimetype(String),
    Mode(u32),
    NoTrunc(bool),
    Numlinks(u32),
    Owner(String),
    OwnerGroup(String),
    QuotaAvailHard(u64),
    QuotaAvailSoft(u64),
    QuotaUsed(u64),
    Rawdev(Specdata4),
    SpaceAvail(u64),
    SpaceFree(u64),
    SpaceTotal(u64),
    SpaceUsed(u64),
    System(bool),
    TimeAccess(Nfstime4),
    TimeAccessSet(Settime4),
    TimeBackup(Nfstime4),
    TimeCreate(Nfstime4),
    TimeDelta(Nfstime4),
    TimeMetadata(Nfstime4),
    TimeModify(Nfstime4),
    TimeModifySet(Settime4),
    MountedOnFileid(u64),
}

impl FileAttrValue {
    pub fn attr(&self) -> FileAttr {
        match self {
            FileAttrValue::SupportedAttrs(_) => FileAttr::SupportedAttrs,
            FileAttrValue::Type(_) => FileAttr::Type,
            FileAttrValue::FhExpireType(_) => FileAttr::FhExpireType,
            FileAttrValue::Change(_) => FileAttr::Change,
            FileAttrValue::Size(_) => FileAttr::Size,
            FileAttrValue::LinkSupport(_) => FileAttr::LinkSupport,
            FileAttrValue::SymlinkSupport(_) => FileAttr::SymlinkSupport,
            FileAttrValue::NamedAttr(_) => FileAttr::NamedAttr,
            FileAttrValue::Fsid(_) => FileAttr::Fsid,
            FileAttrValue::UniqueHandles(_) => FileAttr::UniqueHandles,
            FileAttrValue::LeaseTime(_) => FileAttr::LeaseTime,
            FileAttrValue::RdattrError(_) => FileAttr::RdattrError,
            FileAttrValue::Acl(_) => FileAttr::Acl,
            FileAttrValue::AclSupport(_) => FileAttr::AclSupport,
            FileAttrValue::Archive(_) => FileAttr::Archive,
            FileAttrValue::Cansettime(_) => FileAttr::Cansettime,
            FileAttrValue::CaseInsensitive(_) => FileAttr::CaseInsensitive,
            FileAttrValue::CasePreserving(_) => FileAttr::CasePreserving,
            FileAttrValue::ChownRestricted(_) => FileAttr::ChownRestricted,
            FileAttrValue::Filehandle(_) => FileAttr::Filehandle,
            FileAttrValue::Fileid(_) => FileAttr::Fileid,
            FileAttrValue::FilesAvail(_) => FileAttr::FilesAvail,
            FileAttrValue::FilesFree(_) => FileAttr::FilesFree,
            FileAttrValue::FilesTotal(_) => FileAttr::FilesTotal,
            FileAttrValue::Hidden(_) => FileAttr::Hidden,
            FileAttrValue::Homogeneous(_) => FileAttr::Homogeneous,
            FileAttrValue::Maxfilesize(_) => FileAttr::Maxfilesize,
            FileAttrValue::Maxlink(_) => FileAttr::Maxlink,
            FileAttrValue::Maxname(_) => FileAttr::Maxname,
            FileAttrValue::Maxread(_) => FileAttr::Maxread,
            FileAttrValue::Maxwrite(_) => FileAttr::Maxwrite,
            FileAttrValue::Mimetype(_) => FileAttr::Mimetype,
            FileAttrValue::Mode(_) => FileAttr::Mode,
            FileAttrValue::NoTrunc(_) => FileAttr::NoTrunc,
            FileAttrValue::Numlinks(_) => FileAttr::Numlinks,
            FileAttrValue::Owner(_) => FileAttr::Owner,
            FileAttrValue::OwnerGroup(_) => FileAttr::OwnerGroup,
            FileAttrValue::QuotaAvailHard(_) => FileAttr::QuotaAvailHard,
            FileAttrValue::QuotaAvailSoft(_) => FileAttr::QuotaAvailSoft,
            FileAttrValue::QuotaUsed(_) => FileAttr::QuotaUsed,
            FileAttrValue::Rawdev(_) => FileAttr::Rawdev,
            FileAttrValue::SpaceAvail(_) => FileAttr::SpaceAvail,
            FileAttrValue::SpaceFree(_) => FileAttr::SpaceFree,
            FileAttrValue::SpaceTotal(_) => FileAttr::SpaceTotal,
            FileAttrValue::SpaceUsed(_) => FileAttr::SpaceUsed,
            FileAttrValue::System(_) => FileAttr::System,
            FileAttrValue::TimeAccess(_) => FileAttr::TimeAccess,
            FileAttrValue::TimeAccessSet(_) => FileAttr::TimeAccessSet,
            FileAttrValue::TimeBackup(_) => FileAttr::TimeBackup,
            FileAttrValue::TimeCreate(_) => FileAttr::TimeCreate,
            FileAttrValue::TimeDelta(_) => FileAttr::TimeDelta,
            FileAttrValue::TimeMetadata(_) => FileAttr::TimeMetadata,
            FileAttrValue::TimeModify(_) => FileAttr::TimeModify,
            FileAttrValue::TimeModifySet(_) => FileAttr::TimeModifySet,
            FileAttrValue::MountedOnFileid(_) => FileAttr::MountedOnFileid,
        }
    }

    fn encode_value(&self, writer: &mut XdrWriter) {
        match self {
            FileAttrValue::SupportedAttrs(list) => list.encode(writer),
            FileAttrValue::Type(v) => v.encode(writer),
            FileAttrValue::FhExpireType(v) => writer.write_u32(*v),
            FileAttrValue::Change(v) => writer.write_u64(*v),
            FileAttrValue::Size(v) => writer.write_u64(*v),
            FileAttrValue::LinkSupport(v) => writer.write_bool(*v),
            FileAttrValue::SymlinkSupport(v) => writer.write_bool(*v),
            FileAttrValue::NamedAttr(v) => writer.write_bool(*v),
            FileAttrValue::Fsid(v) => v.encode(writer),
            FileAttrValue::UniqueHandles(v) => writer.write_bool(*v),
            FileAttrValue::LeaseTime(v) => writer.write_u32(*v),
            FileAttrValue::RdattrError(v) => v.encode(writer),
            FileAttrValue::Acl(aces) => {
                writer.write_u32(aces.len() as u32);
                for ace in aces {
                    ace.encode(writer);
                }
            }
            FileAttrValue::AclSupport(v) => writer.write_u32(*v),
            FileAttrValue::Archive(v) => writer.write_bool(*v),
            FileAttrValue::Cansettime(v) => writer.write_bool(*v),
            FileAttrValue::CaseInsensitive(v) => writer.write_bool(*v),
            FileAttrValue::CasePreserving(v) => writer.write_bool(*v),
            FileAttrValue::ChownRestricted(v) => writer.write_bool(*v),
            FileAttrValue::Filehandle(v) => writer.write_opaque(v),
            FileAttrValue::Fileid(v) => writer.write_u64(*v),
            FileAttrValue::FilesAvail(v) => writer.write_u64(*v),
            FileAttrValue::FilesFree(v) => writer.write_u64(*v),
            FileAttrValue::FilesTotal(v) => writer.write_u64(*v),
            FileAttrValue::Hidden(v) => writer.write_bool(*v),
            FileAttrValue::Homogeneous(v) => writer.write_bool(*v),
            FileAttrValue::Maxfilesize(v) => writer.write_u64(*v),
            FileAttrValue::Maxlink(v) => writer.write_u32(*v),
            FileAttrValue::Maxname(v) => writer.write_u32(*v),
            FileAttrValue::Maxread(v) => writer.write_u64(*v),
            FileAttrValue::Maxwrite(v) => writer.write_u64(*v),
            FileAttrValue::Mimetype(v) => writer.write_string(v),
            FileAttrValue::Mode(v) => writer.write_u32(*v),
            FileAttrValue::NoTrunc(v) => writer.write_bool(*v),
            FileAttrValue::Numlinks(v) => writer.write_u32(*v),
            FileAttrValue::Owner(v) => writer.write_string(v),
            FileAttrValue::OwnerGroup(v) => writer.write_string(v),
            FileAttrValue::QuotaAvailHard(v) => writer.write_u64(*v),
            FileAttrValue::QuotaAvailSoft(v) => writer.write_u64(*v),
            FileAttrValue::QuotaUsed(v) => writer.write_u64(*v),
            FileAttrValue::Rawdev(v) => v.encode(writer),
            FileAttrValue::SpaceAvail(v) => writer.write_u64(*v),
            FileAttrValue::SpaceFree(v) => writer.write_u64(*v),
            FileAttrValue::SpaceTotal(v) => writer.write_u64(*v),
            FileAttrValue::SpaceUsed(v) => writer.write_u64(*v),
            FileAttrValue::System(v) => writer.write_bool(*v),
            FileAttrValue::TimeAccess(v) => v.encode(writer),
            FileAttrValue::TimeAccessSet(v) => v.encode(writer),
            FileAttrValue::TimeBackup(v) => v.encode(writer),
            FileAttrValue::TimeCreate(v) => v.encode(writer),
            FileAttrValue::TimeDelta(v) => v.encode(writer),
            FileAttrValue::TimeMetadata(v) => v.encode(writer),
            FileAttrValue::TimeModify(v) => v.encode(writer),
            FileAttrValue::TimeModifySet(v) => v.encode(writer),
            FileAttrValue::MountedOnFileid(v) => writer.write_u64(*v),
        }
    }

    fn decode_value(attr: FileAttr, reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        Ok(match attr {
            FileAttr::SupportedAttrs => {
                FileAttrValue::SupportedAttrs(FileAttrList::decode(reader)?)
            }
            FileAttr::Type => FileAttrValue::Type(NfsFtype4::decode(reader)?),
            FileAttr::FhExpireType => FileAttrValue::FhExpireType(reader.read_u32()?),
            FileAttr::Change => FileAttrValue::Change(reader.read_u64()?),
            FileAttr::Size => FileAttrValue::Size(reader.read_u64()?),
            FileAttr::LinkSupport => FileAttrValue::LinkSupport(reader.read_bool()?),
            FileAttr::SymlinkSupport => FileAttrValue::SymlinkSupport(reader.read_bool()?),
            FileAttr::NamedAttr => FileAttrValue::NamedAttr(reader.read_bool()?),
            FileAttr::Fsid => FileAttrValue::Fsid(Fsid4::decode(reader)?),
            FileAttr::UniqueHandles => FileAttrValue::UniqueHandles(reader.read_bool()?),
            FileAttr::LeaseTime => FileAttrValue::LeaseTime(reader.read_u32()?),
            FileAttr::RdattrError => FileAttrValue::RdattrError(NfsStat4::decode(reader)?),
            FileAttr::Acl => {
                let count = reader.read_u32()? as usize;
                if count > MAX_ACL_ENTRIES {
                    return Err(XdrError::LimitExceeded {
                        length: count,
                        limit: MAX_ACL_ENTRIES,
                    });
                }
                let mut aces = Vec::with_capacity(count);
                for _ in 0..count {
                    aces.push(Nfsace4::decode(reader)?);
                }
                FileAttrValue::Acl(aces)
            }
            FileAttr::AclSupport => FileAttrValue::AclSupport(reader.read_u32()?),
            FileAttr::Archive => FileAttrValue::Archive(reader.read_bool()?),
            FileAttr::Cansettime => FileAttrValue::Cansettime(reader.read_bool()?),
            FileAttr::CaseInsensitive => FileAttrValue::CaseInsensitive(reader.read_bool()?),
            FileAttr::CasePreserving => FileAttrValue::CasePreserving(reader.read_bool()?),
            FileAttr::ChownRestricted => FileAttrValue::ChownRestricted(reader.read_bool()?),
            FileAttr::Filehandle => FileAttrValue::Filehandle(reader.read_opaque()?),
            FileAttr::Fileid => FileAttrValue::Fileid(reader.read_u64()?),
            FileAttr::FilesAvail => FileAttrValue::FilesAvail(reader.read_u64()?),
            FileAttr::FilesFree => FileAttrValue::FilesFree(reader.read_u64()?),
            FileAttr::FilesTotal => FileAttrValue::FilesTotal(reader.read_u64()?),
            FileAttr::FsLocations => {
                return Err(XdrError::UnsupportedAttribute(
                    FileAttr::FsLocations as u32,
                ))
            }
            FileAttr::Hidden => FileAttrValue::Hidden(reader.read_bool()?),
            FileAttr::Homogeneous => FileAttrValue::Homogeneous(reader.read_bool()?),
            FileAttr::Maxfilesize => FileAttrValue::Maxfilesize(reader.read_u64()?),
            FileAttr::Maxlink => FileAttrValue::Maxlink(reader.read_u32()?),
            FileAttr::Maxname => FileAttrValue::Maxname(reader.read_u32()?),
            FileAttr::Maxread => FileAttrValue::Maxread(reader.read_u64()?),
            FileAttr::Maxwrite => FileAttrValue::Maxwrite(reader.read_u64()?),
            FileAttr::Mimetype => {
                FileAttrValue::Mimetype(reader.read_string_max(NFS4_OPAQUE_LIMIT)?)
            }
            FileAttr::Mode => FileAttrValue::Mode(reader.read_u32()?),
            FileAttr::NoTrunc => FileAttrValue::NoTrunc(reader.read_bool()?),
            FileAttr::Numlinks => FileAttrValue::Numlinks(reader.read_u32()?),
            FileAttr::Owner => FileAttrValue::Owner(reader.read_string_max(NFS4_OPAQUE_LIMIT)?),
            FileAttr::OwnerGroup => {
                FileAttrValue::OwnerGroup(reader.read_string_max(NFS4_OPAQUE_LIMIT)?)
            }
            FileAttr::QuotaAvailHard => FileAttrValue::QuotaAvailHard(reader.read_u64()?),
            FileAttr::QuotaAvailSoft => FileAttrValue::QuotaAvailSoft(reader.read_u64()?),
            FileAttr::QuotaUsed => FileAttrValue::QuotaUsed(reader.read_u64()?),
            FileAttr::Rawdev => FileAttrValue::Rawdev(Specdata4::decode(reader)?),
            FileAttr::SpaceAvail => FileAttrValue::SpaceAvail(reader.read_u64()?),
            FileAttr::SpaceFree => FileAttrValue::SpaceFree(reader.read_u64()?),
            FileAttr::SpaceTotal => FileAttrValue::SpaceTotal(reader.read_u64()?),
            FileAttr::SpaceUsed => FileAttrValue::SpaceUsed(reader.read_u64()?),
            FileAttr::System => FileAttrValue::System(reader.read_bool()?),
            FileAttr::TimeAccess => FileAttrValue::TimeAccess(Nfstime4::decode(reader)?),
            FileAttr::TimeAccessSet => FileAttrValue::TimeAccessSet(Settime4::decode(reader)?),
            FileAttr::TimeBackup => FileAttrValue::TimeBackup(Nfstime4::decode(reader)?),
            FileAttr::TimeCreate => FileAttrValue::TimeCreate(Nfstime4::decode(reader)?),
            FileAttr::TimeDelta => FileAttrValue::TimeDelta(Nfstime4::decode(reader)?),
            FileAttr::TimeMetadata => FileAttrValue::TimeMetadata(Nfstime4::decode(reader)?),
            FileAttr::TimeModify => FileAttrValue::TimeModify(Nfstime4::decode(reader)?),
            FileAttr::TimeModifySet => FileAttrValue::TimeModifySet(Settime4::decode(reader)?),
            FileAttr::MountedOnFileid => FileAttrValue::MountedOnFileid(reader.read_u64()?),
        })
    }
}

/// File attribute container: mask plus values, values packed in ascending
/// attribute-number order.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Fattr4 {
    pub attrmask: FileAttrList,
    pub attr_vals: Vec<FileAttrValue>,
}

impl Fattr4 {
    /// Builds a consistent fattr4 from a value list: the mask is derived
    /// and the values sorted into wire order.
    pub fn from_values(mut attr_vals: Vec<FileAttrValue>) -> Self {
        attr_vals.sort_by_key(|v| v.attr());
        let attrmask = FileAttrList::new(attr_vals.iter().map(|v| v.attr()).collect());
        Fattr4 {
            attrmask,
            attr_vals,
        }
    }

    pub fn value(&self, attr: FileAttr) -> Option<&FileAttrValue> {
        self.attr_vals.iter().find(|v| v.attr() == attr)
    }
}

impl XdrEncode for Fattr4 {
    fn encode(&self, writer: &mut XdrWriter) {
        self.attrmask.encode(writer);
        let mut vals = XdrWriter::new();
        let mut sorted: Vec<&FileAttrValue> = self.attr_vals.iter().collect();
        sorted.sort_by_key(|v| v.attr());
        for val in sorted {
            val.encode_value(&mut vals);
        }
        writer.write_opaque(vals.as_slice());
    }
}

impl XdrDecode for Fattr4 {
    fn decode(reader: &mut XdrReader<'_>) -> XdrResult<Self> {
        let words = reader.read_bitmap()?;
        let attrs = bitmap_to_attrs_strict(&words)?;
        let blob = reader.read_opaque()?;
        let mut vals_reader = XdrReader::new(&blob);
        let mut attr_vals = Vec::with_capacity(attrs.len());
        for attr in &attrs {
            attr_vals.push(FileAttrValue::decode_value(*attr, &mut vals_reader)?);
        }
        Ok(Fattr4 {
            attrmask: FileAttrList(attrs),
            attr_vals,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_values() -> Vec<FileAttrValue> {
        vec![
            FileAttrValue::Size(1234),
            FileAttrValue::Type(NfsFtype4::Nf4reg),
            FileAttrValue::Mode(0o644),
            FileAttrValue::Owner("alice@example.net".to_string()),
            FileAttrValue::TimeModify(Nfstime4 {
                seconds: 1_700_000_000,
                nseconds: 42,
            }),
        ]
    }

    #[test]
    fn bitmap_conversion_ascending() {
        let attrs = vec![FileAttr::Type, FileAttr::Size, FileAttr::Mode];
        let words = attrs_to_bitmap(&attrs);
        assert_eq!(words.len(), 2);
        assert_eq!(words[0], (1 << 1) | (1 << 4));
        assert_eq!(words[1], 1 << (33 - 32));
        assert_eq!(bitmap_to_attrs(&words), vec![
            FileAttr::Type,
            FileAttr::Size,
            FileAttr::Mode
        ]);
    }

    #[test]
    fn fattr_roundtrip_every_supported_bit() {
        // Property: decode(encode(B, V)) == V for each attribute singly.
        let singles = vec![
            FileAttrValue::SupportedAttrs(FileAttrList::new(vec![
                FileAttr::Type,
                FileAttr::Change,
            ])),
            FileAttrValue::Type(NfsFtype4::Nf4dir),
            FileAttrValue::FhExpireType(2),
            FileAttrValue::Change(7),
            FileAttrValue::Size(u64::MAX),
            FileAttrValue::LinkSupport(true),
            FileAttrValue::SymlinkSupport(false),
            FileAttrValue::NamedAttr(false),
            FileAttrValue::Fsid(Fsid4 { major: 1, minor: 2 }),
            FileAttrValue::UniqueHandles(true),
            FileAttrValue::LeaseTime(90),
            FileAttrValue::RdattrError(NfsStat4::Nfs4errInval),
            FileAttrValue::Acl(vec![Nfsace4 {
                acetype: 0,
                flag: 0,
                access_mask: 0x1200a9,
                who: "OWNER@".to_string(),
            }]),
            FileAttrValue::AclSupport(0x0f),
            FileAttrValue::Cansettime(true),
            FileAttrValue::CaseInsensitive(false),
            FileAttrValue::CasePreserving(true),
            FileAttrValue::Filehandle(vec![1, 2, 3]),
            FileAttrValue::Fileid(99),
            FileAttrValue::Maxfilesize(1 << 40),
            FileAttrValue::Maxlink(255),
            FileAttrValue::Maxname(255),
            FileAttrValue::Maxread(1 << 20),
            FileAttrValue::Maxwrite(1 << 20),
            FileAttrValue::Mode(0o755),
            FileAttrValue::NoTrunc(true),
            FileAttrValue::Numlinks(3),
            FileAttrValue::Owner("OWNER@".to_string()),
            FileAttrValue::OwnerGroup("GROUP@".to_string()),
            FileAttrValue::SpaceUsed(4096),
            FileAttrValue::TimeAccess(Nfstime4 {
                seconds: 10,
                nseconds: 20,
            }),
            FileAttrValue::TimeAccessSet(Settime4::ServerTime),
            FileAttrValue::TimeCreate(Nfstime4 {
                seconds: 1,
                nseconds: 0,
            }),
            FileAttrValue::TimeMetadata(Nfstime4 {
                seconds: 2,
                nseconds: 0,
            }),
            FileAttrValue::TimeModify(Nfstime4 {
                seconds: 3,
                nseconds: 0,
            }),
            FileAttrValue::TimeModifySet(Settime4::ClientTime(Nfstime4 {
                seconds: 4,
                nseconds: 5,
            })),
            FileAttrValue::MountedOnFileid(7),
        ];
        for value in singles {
            let fattr = Fattr4::from_values(vec![value.clone()]);
            let mut w = XdrWriter::new();
            fattr.encode(&mut w);
            let bytes = w.into_bytes();
            let mut r = XdrReader::new(&bytes);
            let decoded = Fattr4::decode(&mut r).unwrap();
            assert_eq!(decoded.attr_vals, vec![value]);
            assert_eq!(r.remaining(), 0);
        }
    }

    #[test]
    fn fattr_values_packed_in_ascending_order() {
        // Values supplied out of order still land in wire order.
        let fattr = Fattr4::from_values(sample_values());
        let mut w = XdrWriter::new();
        fattr.encode(&mut w);
        let bytes = w.into_bytes();
        let mut r = XdrReader::new(&bytes);
        let decoded = Fattr4::decode(&mut r).unwrap();
        let order: Vec<FileAttr> = decoded.attr_vals.iter().map(|v| v.attr()).collect();
        assert_eq!(order, vec![
            FileAttr::Type,
            FileAttr::Size,
            FileAttr::Mode,
            FileAttr::Owner,
            FileAttr::TimeModify
        ]);
    }

    #[test]
    fn unknown_mask_bit_is_rejected_on_decode() {
        let mut w = XdrWriter::new();
        // bit 56 has no assigned attribute in this registry
        w.write_bitmap(&[0, 1 << 24]);
        w.write_opaque(&[]);
        let bytes = w.into_bytes();
        let mut r = XdrReader::new(&bytes);
        assert!(matches!(
            Fattr4::decode(&mut r),
            Err(XdrError::UnsupportedAttribute(56))
        ));
    }

    #[test]
    fn acl_count_cap() {
        let mut w = XdrWriter::new();
        w.write_bitmap(&[1 << 12]);
        let mut vals = XdrWriter::new();
        vals.write_u32((MAX_ACL_ENTRIES + 1) as u32);
        w.write_opaque(vals.as_slice());
        let bytes = w.into_bytes();
        let mut r = XdrReader::new(&bytes);
        assert!(matches!(
            Fattr4::decode(&mut r),
            Err(XdrError::LimitExceeded { .. })
        ));
    }

    #[test]
    fn special_who_tokens_survive() {
        let ace = Nfsace4 {
            acetype: 0,
            flag: 0,
            access_mask: 1,
            who: "EVERYONE@".to_string(),
        };
        let fattr = Fattr4::from_values(vec![FileAttrValue::Acl(vec![ace.clone()])]);
        let mut w = XdrWriter::new();
        fattr.encode(&mut w);
        let bytes = w.into_bytes();
        let mut r = XdrReader::new(&bytes);
        let decoded = Fattr4::decode(&mut r).unwrap();
        match &decoded.attr_vals[0] {
            FileAttrValue::Acl(aces) => assert_eq!(aces[0].who, "EVERYONE@"),
            other => panic!("wrong value: {:?}", other),
        }
    }

    #[test]
    fn intersection_drops_unsupported_bits() {
        let requested = FileAttrList::new(vec![
            FileAttr::Type,
            FileAttr::Hidden,
            FileAttr::Size,
            FileAttr::System,
        ]);
        let supported = FileAttrList::new(vec![FileAttr::Type, FileAttr::Size]);
        let granted = requested.intersect(&supported);
        assert_eq!(granted.0, vec![FileAttr::Type, FileAttr::Size]);
    }
}
