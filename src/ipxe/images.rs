//! Precompiled iPXE NBP binary set: loaded once at startup, patched
//! per-response (spec §3 `IPXEArtifact`, §4.B).

use std::collections::HashMap;

use crate::error::IpxeError;

/// iPXE build convention: the embedded script region is bracketed by this
/// marker so post-build patching can find it without a hard-coded offset
/// (spec §9 open question: "use the canonical marker sequence rather than
/// a hard-coded offset").
const PATCH_MARKER: &[u8] = b"\xeb\x01\xff\0PLACEHOLDER PATCH AREA FOR IPXE\0";

/// A single precompiled NBP binary plus its patch-region bounds (resolved
/// once at load time).
#[derive(Debug, Clone)]
pub struct IpxeImage {
    bytes: Vec<u8>,
    patch_region: Option<(usize, usize)>,
}

impl IpxeImage {
    pub fn new(bytes: Vec<u8>) -> Self {
        let patch_region = find_marker(&bytes);
        Self { bytes, patch_region }
    }

    pub fn original_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Overlay `patch` into the reserved region, zero-padded to region
    /// length (spec §4.B "Patching"). Returns a new buffer; the original
    /// is untouched. The returned buffer's length always equals the
    /// original's (spec §3 invariant).
    pub fn patched(&self, patch: &[u8]) -> Result<Vec<u8>, IpxeError> {
        let Some((start, len)) = self.patch_region else {
            return Err(IpxeError::MarkerNotFound("(unnamed image)".to_string()));
        };

        if patch.len() > len {
            return Err(IpxeError::PatchTooLarge {
                patch_len: patch.len(),
                region_len: len,
            });
        }

        let mut out = self.bytes.clone();
        out[start..start + patch.len()].copy_from_slice(patch);
        for b in &mut out[start + patch.len()..start + len] {
            *b = 0;
        }

        debug_assert_eq!(out.len(), self.bytes.len());
        Ok(out)
    }
}

fn find_marker(bytes: &[u8]) -> Option<(usize, usize)> {
    bytes
        .windows(PATCH_MARKER.len())
        .position(|window| window == PATCH_MARKER)
        .map(|start| (start, PATCH_MARKER.len()))
}

/// The full set of iPXE binaries this server can chain-load into, keyed
/// by the filename clients request (`undionly.kpxe`, `ipxe.efi`, `snp.efi`).
#[derive(Debug, Clone, Default)]
pub struct IpxeImageSet {
    images: HashMap<String, IpxeImage>,
}

impl IpxeImageSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image(mut self, filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.images.insert(filename.into(), IpxeImage::new(bytes));
        self
    }

    pub fn get(&self, filename: &str) -> Result<&IpxeImage, IpxeError> {
        self.images.get(filename).ok_or_else(|| IpxeError::UnknownArtifact(filename.to_string()))
    }

    /// Serve either the unpatched original (`patch` empty) or a patched
    /// copy (spec §4.B "Failure semantics": unknown filename → 404).
    pub fn serve(&self, filename: &str, patch: &[u8]) -> Result<Vec<u8>, IpxeError> {
        let image = self.get(filename)?;
        if patch.is_empty() {
            Ok(image.original_bytes().to_vec())
        } else {
            image.patched(patch)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image_with_marker(prefix_len: usize, suffix_len: usize) -> Vec<u8> {
        let mut bytes = vec![0xAAu8; prefix_len];
        bytes.extend_from_slice(PATCH_MARKER);
        bytes.extend(vec![0xBBu8; suffix_len]);
        bytes
    }

    #[test]
    fn unknown_filename_is_an_error() {
        let set = IpxeImageSet::new();
        assert!(matches!(set.get("nope.efi"), Err(IpxeError::UnknownArtifact(_))));
    }

    #[test]
    fn patch_splice_preserves_length_and_places_bytes_at_marker_offset() {
        let base = image_with_marker(16, 32);
        let set = IpxeImageSet::new().with_image("undionly.kpxe", base.clone());

        let patch = b"#!ipxe\nautoboot\n";
        let patched = set.serve("undionly.kpxe", patch).unwrap();

        assert_eq!(patched.len(), base.len());
        assert_eq!(&patched[16..16 + patch.len()], patch);
    }

    #[test]
    fn oversized_patch_is_rejected() {
        let base = image_with_marker(0, 0);
        let set = IpxeImageSet::new().with_image("undionly.kpxe", base);

        let patch = vec![0u8; PATCH_MARKER.len() + 1];
        assert!(matches!(
            set.serve("undionly.kpxe", &patch),
            Err(IpxeError::PatchTooLarge { .. })
        ));
    }

    #[test]
    fn empty_patch_serves_the_original_unmodified() {
        let base = image_with_marker(4, 4);
        let set = IpxeImageSet::new().with_image("ipxe.efi", base.clone());
        assert_eq!(set.serve("ipxe.efi", &[]).unwrap(), base);
    }

    #[test]
    fn missing_marker_is_an_error_on_patch_attempt() {
        let base = vec![0u8; 64];
        let set = IpxeImageSet::new().with_image("snp.efi", base);
        assert!(matches!(
            set.serve("snp.efi", b"x"),
            Err(IpxeError::MarkerNotFound(_))
        ));
    }
}
