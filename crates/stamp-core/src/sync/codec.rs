//! Conversion between local entries and wire payloads.
//!
//! Photos travel either inline (Base64) or externalized to blob storage as a
//! public URL. Decoding tells the two apart by prefix, so payloads written by
//! either strategy can be read.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Deserializer, Serialize};

use super::SyncError;
use crate::models::{Coordinate, Entry, EntryId};
use crate::storage::BlobStorage;
use crate::util::{format_iso_millis, is_http_url, parse_iso_millis};

/// Content type used for externalized photos
pub const PHOTO_CONTENT_TYPE: &str = "image/jpeg";

/// Remote row representation of an entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WirePayload {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub location: String,
    /// Event date, ISO-8601
    pub date: String,
    /// Public URL or Base64 image data
    #[serde(default)]
    pub photo: Option<String>,
    /// Last local edit, ISO-8601
    pub last_edited_at: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_archived: bool,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub created_at: Option<String>,
    /// Server-side change marker, ISO-8601. Stamped by the database on
    /// every write, so clients never send it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// Where a decoded photo lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhotoRef {
    /// Externalized; bytes must be downloaded
    Url(String),
    /// Legacy inline Base64, already decoded
    Inline(Vec<u8>),
}

impl PhotoRef {
    /// Classify a wire photo value.
    ///
    /// Empty or undecodable values yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        if is_http_url(value) {
            return Some(Self::Url(value.to_string()));
        }

        let data = if value.starts_with("data:") {
            value.split_once("base64,")?.1
        } else {
            value
        };
        match STANDARD.decode(data.trim()) {
            Ok(bytes) if !bytes.is_empty() => Some(Self::Inline(bytes)),
            Ok(_) => None,
            Err(error) => {
                tracing::warn!("Ignoring malformed inline photo: {error}");
                None
            }
        }
    }
}

/// A decoded payload whose photo may still need downloading.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRecord {
    pub entry: Entry,
    pub photo_url: Option<String>,
}

/// Outcome of resolving a decoded record's photo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhotoResolution {
    /// The payload carries no photo
    Absent,
    /// Photo bytes are attached to the entry
    Attached,
    /// The payload referenced a photo that could not be fetched
    Unavailable,
}

/// Object path for an entry's externalized photo.
pub fn photo_path(id: &EntryId) -> String {
    format!("{id}.jpg")
}

/// Base64 text for inline photo transport.
pub fn inline_photo(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Encode an entry with an already-resolved photo reference.
///
/// `updated_at` is left unset for the server to stamp.
pub fn encode_payload(entry: &Entry, photo: Option<String>) -> WirePayload {
    let (latitude, longitude) = entry
        .coordinate
        .filter(|coordinate| !coordinate.is_sentinel())
        .map_or((None, None), |coordinate| {
            (Some(coordinate.latitude), Some(coordinate.longitude))
        });

    WirePayload {
        id: entry.id.as_str(),
        title: entry.title.clone(),
        content: entry.notes.clone(),
        location: entry.location.clone(),
        date: format_iso_millis(entry.date),
        photo,
        last_edited_at: format_iso_millis(entry.edit_timestamp),
        is_archived: entry.is_archived,
        latitude,
        longitude,
        created_at: Some(format_iso_millis(entry.created_at)),
        updated_at: None,
    }
}

/// Decode a payload into an entry.
///
/// Inline photos are attached directly; URL photos are returned for
/// [`resolve_photo`].
pub fn decode_payload(payload: WirePayload) -> Result<DecodedRecord, SyncError> {
    let id: EntryId = payload
        .id
        .parse()
        .map_err(|_| SyncError::Decoding(format!("invalid entry id '{}'", payload.id)))?;
    let date = parse_timestamp(&payload.date, "date", &id)?;
    let edit_timestamp = parse_timestamp(&payload.last_edited_at, "last_edited_at", &id)?;
    let created_at = match payload.created_at.as_deref() {
        Some(value) => parse_timestamp(value, "created_at", &id)?,
        None => edit_timestamp,
    };

    let (photo, photo_url) = match payload.photo.as_deref().and_then(PhotoRef::parse) {
        Some(PhotoRef::Inline(bytes)) => (Some(bytes), None),
        Some(PhotoRef::Url(url)) => (None, Some(url)),
        None => (None, None),
    };

    Ok(DecodedRecord {
        entry: Entry {
            id,
            title: payload.title,
            location: payload.location,
            notes: payload.content,
            date,
            photo,
            edit_timestamp,
            is_archived: payload.is_archived,
            coordinate: Coordinate::from_parts(payload.latitude, payload.longitude),
            created_at,
        },
        photo_url,
    })
}

/// Decode a raw remote row.
pub fn decode_row(row: serde_json::Value) -> Result<DecodedRecord, SyncError> {
    let payload: WirePayload = serde_json::from_value(row)
        .map_err(|error| SyncError::Decoding(format!("malformed payload: {error}")))?;
    decode_payload(payload)
}

/// Server-side `updated_at` of a raw remote row, if present and parseable.
pub fn row_updated_at(row: &serde_json::Value) -> Option<i64> {
    row.get("updated_at")?.as_str().and_then(parse_iso_millis)
}

/// Encode an entry, externalizing its photo when blob storage is configured.
///
/// A failed photo upload drops the photo from this payload rather than
/// failing the entry.
pub async fn encode_with_photo<B: BlobStorage>(
    entry: &Entry,
    blobs: Option<&B>,
) -> WirePayload {
    let photo = match (entry.photo.as_deref().filter(|bytes| !bytes.is_empty()), blobs) {
        (None, _) => None,
        (Some(bytes), None) => Some(inline_photo(bytes)),
        (Some(bytes), Some(blobs)) => externalize(&entry.id, bytes, blobs).await,
    };
    encode_payload(entry, photo)
}

async fn externalize<B: BlobStorage>(id: &EntryId, bytes: &[u8], blobs: &B) -> Option<String> {
    let path = photo_path(id);
    if let Err(error) = blobs.upload(&path, bytes, PHOTO_CONTENT_TYPE, true).await {
        tracing::warn!("Photo upload failed for entry {id}; syncing without photo: {error}");
        return None;
    }
    match blobs.public_url(&path) {
        Ok(url) => Some(url),
        Err(error) => {
            tracing::warn!("No public URL for entry {id} photo; syncing without photo: {error}");
            None
        }
    }
}

/// Download a URL photo into the decoded entry.
///
/// Unreachable photos leave the entry without a photo.
pub async fn resolve_photo<B: BlobStorage>(
    record: DecodedRecord,
    blobs: Option<&B>,
) -> (Entry, PhotoResolution) {
    let DecodedRecord {
        mut entry,
        photo_url,
    } = record;

    let Some(url) = photo_url else {
        let resolution = if entry.has_photo() {
            PhotoResolution::Attached
        } else {
            PhotoResolution::Absent
        };
        return (entry, resolution);
    };

    let Some(blobs) = blobs else {
        tracing::warn!(
            "Entry {} references photo {url} but no blob storage is configured",
            entry.id
        );
        return (entry, PhotoResolution::Unavailable);
    };

    match blobs.download(&url).await {
        Ok(bytes) if !bytes.is_empty() => {
            entry.photo = Some(bytes);
            (entry, PhotoResolution::Attached)
        }
        Ok(_) => {
            tracing::warn!("Photo {url} for entry {} is empty", entry.id);
            (entry, PhotoResolution::Unavailable)
        }
        Err(error) => {
            tracing::warn!("Photo download failed for entry {}: {error}", entry.id);
            (entry, PhotoResolution::Unavailable)
        }
    }
}

fn parse_timestamp(value: &str, field: &str, id: &EntryId) -> Result<i64, SyncError> {
    parse_iso_millis(value).ok_or_else(|| {
        SyncError::Decoding(format!("entry {id}: invalid {field} timestamp '{value}'"))
    })
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntryDraft;
    use crate::test_support::MemoryBlobStorage;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];

    fn entry_with(photo: Option<&[u8]>, coordinate: Option<Coordinate>) -> Entry {
        let mut entry = Entry::new(EntryDraft {
            location: "Hoi An".to_string(),
            notes: "Lanterns".to_string(),
            photo: photo.map(<[u8]>::to_vec),
            coordinate,
            ..EntryDraft::titled("Vietnam")
        });
        // Millisecond precision is what the wire carries
        entry.date = 1_704_067_200_000;
        entry
    }

    #[test]
    fn encode_maps_fields_and_timestamps() {
        let entry = entry_with(None, Some(Coordinate::new(15.88, 108.33)));
        let payload = encode_payload(&entry, None);

        assert_eq!(payload.id, entry.id.as_str());
        assert_eq!(payload.content, "Lanterns");
        assert_eq!(payload.date, "2024-01-01T00:00:00.000Z");
        assert_eq!(payload.updated_at, None);
        assert_eq!(payload.latitude, Some(15.88));
        assert_eq!(payload.longitude, Some(108.33));
        assert_eq!(payload.photo, None);
    }

    #[test]
    fn payload_body_leaves_updated_at_to_the_server() {
        let payload = encode_payload(&entry_with(None, None), None);
        let body = serde_json::to_value(&payload).unwrap();
        assert!(body.get("updated_at").is_none());
        assert!(body.get("last_edited_at").is_some());
    }

    #[test]
    fn row_updated_at_reads_server_marker() {
        let row = json!({"id": "x", "updated_at": "2024-01-02T00:00:00.000Z"});
        assert_eq!(row_updated_at(&row), Some(1_704_153_600_000));
        assert_eq!(row_updated_at(&json!({"updated_at": null})), None);
        assert_eq!(row_updated_at(&json!({"updated_at": "soon"})), None);
        assert_eq!(row_updated_at(&json!({})), None);
    }

    #[test]
    fn missing_coordinate_never_materializes_as_zero() {
        let entry = entry_with(None, None);
        let payload = encode_payload(&entry, None);
        assert_eq!((payload.latitude, payload.longitude), (None, None));

        let decoded = decode_payload(payload).unwrap();
        assert_eq!(decoded.entry.coordinate, None);
    }

    #[test]
    fn zero_sentinel_from_legacy_payload_decodes_as_absent() {
        let mut payload = encode_payload(&entry_with(None, None), None);
        payload.latitude = Some(0.0);
        payload.longitude = Some(-0.0);

        let decoded = decode_payload(payload).unwrap();
        assert_eq!(decoded.entry.coordinate, None);
    }

    #[test]
    fn decode_roundtrips_entry_without_photo_url() {
        let entry = entry_with(Some(JPEG), Some(Coordinate::new(-33.86, 151.21)));
        let payload = encode_payload(&entry, Some(inline_photo(JPEG)));

        let decoded = decode_payload(payload).unwrap();
        assert_eq!(decoded.photo_url, None);
        assert_eq!(decoded.entry, entry);
    }

    #[test]
    fn photo_ref_detects_url_inline_and_data_uri() {
        assert_eq!(
            PhotoRef::parse("https://cdn.example.com/a.jpg"),
            Some(PhotoRef::Url("https://cdn.example.com/a.jpg".to_string()))
        );
        assert_eq!(
            PhotoRef::parse(&inline_photo(JPEG)),
            Some(PhotoRef::Inline(JPEG.to_vec()))
        );
        let data_uri = format!("data:image/jpeg;base64,{}", inline_photo(JPEG));
        assert_eq!(
            PhotoRef::parse(&data_uri),
            Some(PhotoRef::Inline(JPEG.to_vec()))
        );
        assert_eq!(PhotoRef::parse("%%% not base64 %%%"), None);
        assert_eq!(PhotoRef::parse("   "), None);
    }

    #[test]
    fn malformed_photo_decodes_to_no_photo() {
        let mut payload = encode_payload(&entry_with(None, None), None);
        payload.photo = Some("!!corrupt!!".to_string());

        let decoded = decode_payload(payload).unwrap();
        assert_eq!(decoded.entry.photo, None);
        assert_eq!(decoded.photo_url, None);
    }

    #[test]
    fn decode_row_tolerates_nulls_and_rejects_bad_ids() {
        let id = EntryId::new();
        let row = json!({
            "id": id.as_str(),
            "title": null,
            "content": null,
            "location": "Quito",
            "date": "2024-03-01",
            "photo": null,
            "last_edited_at": "2024-03-02T10:00:00+00:00",
            "is_archived": null,
            "latitude": -0.18,
            "longitude": null,
            "created_at": null,
            "updated_at": "2024-03-02T10:00:01.5+00:00"
        });

        let decoded = decode_row(row).unwrap();
        assert_eq!(decoded.entry.id, id);
        assert_eq!(decoded.entry.title, "");
        assert!(!decoded.entry.is_archived);
        assert_eq!(decoded.entry.coordinate, None);
        assert_eq!(decoded.entry.created_at, decoded.entry.edit_timestamp);

        let bad = json!({"id": "nope", "date": "2024-03-01", "last_edited_at": "2024-03-01"});
        assert!(matches!(decode_row(bad), Err(SyncError::Decoding(_))));

        let missing_date = json!({"id": id.as_str(), "last_edited_at": "2024-03-01"});
        assert!(matches!(decode_row(missing_date), Err(SyncError::Decoding(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn encode_without_storage_inlines_photo() {
        let entry = entry_with(Some(JPEG), None);
        let payload = encode_with_photo::<MemoryBlobStorage>(&entry, None).await;
        assert_eq!(payload.photo, Some(inline_photo(JPEG)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn photo_url_roundtrip_through_storage() {
        let blobs = MemoryBlobStorage::default();
        let entry = entry_with(Some(JPEG), None);

        let payload = encode_with_photo(&entry, Some(&blobs)).await;
        let url = payload.photo.clone().unwrap();
        assert!(is_http_url(&url));
        assert!(url.ends_with(&photo_path(&entry.id)));

        let decoded = decode_payload(payload).unwrap();
        assert_eq!(decoded.photo_url.as_deref(), Some(url.as_str()));

        let (restored, resolution) = resolve_photo(decoded, Some(&blobs)).await;
        assert_eq!(resolution, PhotoResolution::Attached);
        assert_eq!(restored.photo.as_deref(), Some(JPEG));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_photo_upload_keeps_entry_without_photo() {
        let blobs = MemoryBlobStorage::default();
        blobs.fail_uploads(true);
        let entry = entry_with(Some(JPEG), None);

        let payload = encode_with_photo(&entry, Some(&blobs)).await;
        assert_eq!(payload.photo, None);
        assert_eq!(payload.title, "Vietnam");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unreachable_photo_url_resolves_to_no_photo() {
        let blobs = MemoryBlobStorage::default();
        let mut payload = encode_payload(&entry_with(None, None), None);
        payload.photo = Some("https://cdn.example.com/missing.jpg".to_string());

        let decoded = decode_payload(payload).unwrap();
        let (entry, resolution) = resolve_photo(decoded, Some(&blobs)).await;
        assert_eq!(resolution, PhotoResolution::Unavailable);
        assert_eq!(entry.photo, None);
    }
}
