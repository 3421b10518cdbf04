//! Byte-signature scanning over a module image.
//!
//! A signature is an instruction prefix with a rip-relative 32-bit
//! displacement, followed by a distinguishing suffix. Each match resolves
//! to the absolute address the instruction references. Scanning works on a
//! plain byte slice so it is testable without a live process.

/// An instruction-byte signature with a rip-relative displacement between
/// prefix and suffix.
#[derive(Clone, Copy, Debug)]
pub struct Signature {
    /// Opcode bytes immediately before the displacement.
    pub prefix: &'static [u8],
    /// Bytes expected immediately after the displacement.
    pub suffix: &'static [u8],
}

impl Signature {
    /// Total length of prefix + displacement + suffix.
    fn len(&self) -> usize {
        self.prefix.len() + 4 + self.suffix.len()
    }
}

/// Returns the absolute addresses referenced by every occurrence of the
/// signature in `image` (loaded at `base`), in scan order.
///
/// The displacement is relative to the end of the instruction's
/// displacement field, i.e. `base + pos + prefix_len + 4`.
pub fn find_signature(image: &[u8], base: u64, sig: &Signature) -> Vec<u64> {
    let mut out = Vec::new();
    if image.len() < sig.len() {
        return out;
    }
    let disp_at = sig.prefix.len();
    let suffix_at = disp_at + 4;

    for pos in 0..=(image.len() - sig.len()) {
        let window = &image[pos..pos + sig.len()];
        if !window.starts_with(sig.prefix) {
            continue;
        }
        if &window[suffix_at..] != sig.suffix {
            continue;
        }
        let rel = i32::from_le_bytes([
            window[disp_at],
            window[disp_at + 1],
            window[disp_at + 2],
            window[disp_at + 3],
        ]);
        let rip = base + pos as u64 + suffix_at as u64;
        out.push(rip.wrapping_add_signed(rel as i64));
    }
    out
}
