//! LZSS codec for the options container's compressed sections
//!
//! The bitstream interleaves flag bits (packed LSB-first into flag bytes)
//! with data bytes. A clear flag bit introduces a literal byte; a set flag
//! bit introduces a match, with a second flag bit selecting between the
//! short form (2 length bits + 1 offset byte, lengths 2-5, distances 1-256)
//! and the long form (2 bytes carrying a 3-bit length field and a 13-bit
//! distance, distances 1-8191). A long-form length field of 0 switches to
//! extended lengths: base 9, each 0x00 byte adds 255, and the next nonzero
//! byte terminates the run. A long match with distance 0 terminates the
//! stream.
//!
//! The encoder reproduces the game's token decisions (lazy matching with
//! its adjustment table, match-cost profitability, long-match truncation
//! probing and the match-follow-match literal conversion) so that re-encoded
//! sections are byte-identical to what the game itself would write.

#![allow(clippy::cast_possible_truncation)]

/// Matches are never longer than this; long repeats are split.
const MAX_MATCH_LENGTH: usize = 2048;

/// Largest encodable distance. 13 bits, minus the all-zero pattern that the
/// decoder reserves for the stream terminator.
const MAX_DISTANCE: usize = 8191;

/// Upper bound on an extended match length; a stream claiming more than
/// this is treated as corrupt and decoding stops.
const MAX_EXTENDED_LENGTH: usize = 1 << 24;

/// Decompress an LZSS stream.
///
/// Decoding is best-effort: a stream that ends mid-token yields the bytes
/// produced up to that point, matching the tolerance of the game's own
/// decoder. Callers that know the expected size should verify it.
pub fn decompress(compressed: &[u8]) -> Vec<u8> {
    let mut output = Vec::new();
    let mut in_ptr = 0usize;
    let mut flags: u32 = 0;
    let mut flag_bits: u32 = 0;

    while in_ptr < compressed.len() {
        if flag_bits < 1 {
            flags = u32::from(compressed[in_ptr]);
            in_ptr += 1;
            flag_bits = 8;
        }

        let flag_bit = flags & 1;
        flags >>= 1;
        flag_bits -= 1;

        if flag_bit == 0 {
            // Literal byte
            if in_ptr >= compressed.len() {
                break;
            }
            output.push(compressed[in_ptr]);
            in_ptr += 1;
            continue;
        }

        // Match: the second flag bit selects short vs long form.
        if flag_bits < 1 {
            if in_ptr >= compressed.len() {
                break;
            }
            flags = u32::from(compressed[in_ptr]);
            in_ptr += 1;
            flag_bits = 8;
        }

        let form_bit = flags & 1;
        flags >>= 1;
        flag_bits -= 1;

        if form_bit == 0 {
            // Short match: 2 length bits then an offset byte.
            if flag_bits < 2 {
                if in_ptr >= compressed.len() {
                    break;
                }
                flags |= u32::from(compressed[in_ptr]) << flag_bits;
                in_ptr += 1;
                flag_bits += 8;
            }

            let length = (flags & 3) as usize + 2;
            flags >>= 2;
            flag_bits -= 2;

            if in_ptr >= compressed.len() {
                break;
            }
            let distance = usize::from(compressed[in_ptr]) + 1;
            in_ptr += 1;

            copy_match(&mut output, distance, length);
        } else {
            // Long match: two data bytes, optionally followed by length
            // extension bytes.
            if in_ptr + 1 >= compressed.len() {
                break;
            }
            let byte1 = compressed[in_ptr];
            let byte2 = compressed[in_ptr + 1];
            in_ptr += 2;

            let len_field = usize::from(byte1 >> 5);
            let distance = (usize::from(byte2) << 5) | usize::from(byte1 & 0x1F);

            // Distance 0 is the end-of-stream token.
            if distance == 0 {
                break;
            }

            let length = if len_field == 0 {
                let mut length = 9usize;
                while in_ptr < compressed.len() && compressed[in_ptr] == 0 {
                    in_ptr += 1;
                    length += 255;
                    if length > MAX_EXTENDED_LENGTH {
                        tracing::warn!("LZSS: extended match length overflow, stopping");
                        return output;
                    }
                }
                if in_ptr >= compressed.len() {
                    break;
                }
                length += usize::from(compressed[in_ptr]);
                in_ptr += 1;
                length
            } else {
                len_field + 2
            };

            copy_match(&mut output, distance, length);
        }
    }

    output
}

/// Byte-at-a-time back-reference copy. Distances shorter than the length
/// are legitimate run expansions; positions before the start of the output
/// fall into the encoder's implicit 2-byte zero prefix and produce zeros.
fn copy_match(output: &mut Vec<u8>, distance: usize, length: usize) {
    let mut src = output.len() as isize - distance as isize;
    for _ in 0..length {
        let byte = if src < 0 { 0 } else { output[src as usize] };
        output.push(byte);
        src += 1;
    }
}

/// Bit-packing state for the encoder. Flag bits accumulate LSB-first and
/// are flushed into a reserved flag byte that precedes the data bytes of
/// the tokens it describes.
struct CompressState {
    output: Vec<u8>,
    bit_accum: u32,
    bit_counter: u32,
    flag_byte_ptr: usize,
    prev_token_pos: Option<usize>,
    prev_was_match: bool,
}

impl CompressState {
    fn new() -> Self {
        Self {
            output: Vec::new(),
            bit_accum: 0,
            bit_counter: 0,
            flag_byte_ptr: 0,
            prev_token_pos: None,
            prev_was_match: false,
        }
    }

    fn add_bit(&mut self, bit: u32) {
        let old_counter = self.bit_counter;

        if self.bit_counter == 0 {
            self.flag_byte_ptr = self.output.len();
            self.output.push(0);
        }

        self.bit_counter += 1;
        self.bit_accum |= (bit & 1) << (old_counter & 0x1F);

        if self.bit_counter > 7 {
            self.output[self.flag_byte_ptr] = (self.bit_accum & 0xFF) as u8;
            self.bit_accum >>= 8;
            self.bit_counter -= 8;
            if self.bit_counter > 0 {
                self.flag_byte_ptr = self.output.len();
                self.output.push(0);
            }
        }
    }

    fn flush(&mut self) {
        if self.bit_counter > 0 {
            self.output[self.flag_byte_ptr] =
                (((1u32 << self.bit_counter) - 1) & self.bit_accum) as u8;
        }
    }
}

fn is_short_match(length: usize, offset: usize) -> bool {
    (2..=5).contains(&length) && offset <= 256
}

/// Best back-reference at `pos` within `data` (which includes the 2-byte
/// zero prefix). Scans offsets in ascending order and keeps only strictly
/// longer candidates, so among equal lengths the first found wins. Matches
/// into the prefix bytes are rejected.
fn find_best_match(data: &[u8], pos: usize, max_match_length: usize) -> (usize, usize) {
    if pos < 2 {
        return (0, 0);
    }

    let mut best_length = 0usize;
    let mut best_offset = 0usize;
    let max_length = max_match_length.min(data.len() - pos);
    let max_offset = MAX_DISTANCE.min(pos - 2);
    if max_offset == 0 {
        return (0, 0);
    }

    for check_pos in (pos - max_offset..pos).rev() {
        let offset = pos - check_pos;

        // Cheap rejection: to beat the current best, the candidate must
        // match at the first byte and at the byte just past the best length.
        if best_length >= 2 {
            if data[check_pos] != data[pos] {
                continue;
            }
            if check_pos + best_length < data.len()
                && pos + best_length < data.len()
                && data[check_pos + best_length] != data[pos + best_length]
            {
                continue;
            }
        }

        let mut length = 0usize;
        while length < max_length
            && pos + length < data.len()
            && data[check_pos + length] == data[pos + length]
        {
            length += 1;
        }

        if length > best_length && length >= 2 {
            best_length = length;
            best_offset = offset;
            if best_length >= max_length {
                break;
            }
        }
    }

    (best_length, best_offset)
}

/// Encoded cost of a match token in bits.
fn match_cost(length: usize, offset: usize) -> usize {
    if is_short_match(length, offset) {
        // 1 flag + 1 form + 2 length bits + 8 offset bits
        12
    } else if length < 10 {
        // 1 flag + 1 form + 16 data bits
        18
    } else {
        let extra_bytes = (length - 9).div_ceil(255);
        18 + extra_bytes * 8
    }
}

/// For mid-sized matches, probe whether truncating and emitting a second
/// match later saves enough bits to be worthwhile. Returns the (possibly
/// truncated) length.
fn optimal_match_length(data: &[u8], pos: usize, match_length: usize, match_offset: usize) -> usize {
    if !(50..=500).contains(&match_length) {
        return match_length;
    }

    let mut best_truncate_at = match_length;
    let mut best_savings = 0isize;
    let current_cost = match_cost(match_length, match_offset) as isize;

    let mut check_offset = 10usize;
    while check_offset + 10 < match_length {
        let future_pos = pos + check_offset;
        if future_pos >= data.len() {
            break;
        }

        let (future_length, future_offset) = find_best_match(data, future_pos, MAX_MATCH_LENGTH);
        if future_length >= 50 {
            let truncated_cost = match_cost(check_offset, match_offset) as isize;
            let future_cost = match_cost(future_length, future_offset) as isize;
            let remaining_after_full = match_length - check_offset;
            let remaining_cost_guess = match_cost(remaining_after_full, match_offset) as isize;

            let savings = (current_cost + remaining_cost_guess) - (truncated_cost + future_cost);
            if savings > best_savings && savings >= 10 {
                best_savings = savings;
                best_truncate_at = check_offset;
            }
        }

        check_offset += 10;
    }

    best_truncate_at
}

/// Re-run the lazy-matching decision at `pos + curr_length` to learn whether
/// the next token will be a match. Drives the match-follow-match literal
/// conversion.
fn peek_next_decision(data: &[u8], pos: usize, curr_length: usize) -> bool {
    let next_pos = pos + curr_length;
    if next_pos >= data.len() {
        return false;
    }

    let (mut next_length, next_offset) = find_best_match(data, next_pos, MAX_MATCH_LENGTH);

    if next_length >= 2 && next_pos + 1 < data.len() {
        let (lookahead_length, lookahead_offset) =
            find_best_match(data, next_pos + 1, MAX_MATCH_LENGTH);

        let next_short = is_short_match(next_length, next_offset);
        let lookahead_short = is_short_match(lookahead_length, lookahead_offset);

        let mut adjustment: isize = if next_short { 2 } else { 1 };
        if next_short && !lookahead_short && lookahead_length >= 2 {
            adjustment += 2;
        }
        if lookahead_short && !next_short {
            adjustment -= 1;
        }
        if adjustment < 1 {
            adjustment = 1;
        }
        if next_short && lookahead_short {
            adjustment = 1;
        }

        if lookahead_length as isize >= next_length as isize + adjustment {
            next_length = 0;
        }
    }

    if next_length >= 2 && match_cost(next_length, next_offset) >= 9 * next_length {
        next_length = 0;
    }

    next_length >= 2
}

/// Compress `data` into the game's LZSS bitstream. Empty input yields an
/// empty stream.
pub fn compress(data: &[u8]) -> Vec<u8> {
    if data.is_empty() {
        return Vec::new();
    }

    // The coder runs over the input with an implicit 2-byte zero prefix;
    // the prefix itself is never emitted.
    let mut buffered = Vec::with_capacity(data.len() + 2);
    buffered.extend_from_slice(&[0, 0]);
    buffered.extend_from_slice(data);

    let mut state = CompressState::new();
    let mut pos = 2usize;

    while pos < buffered.len() {
        let (found_length, curr_offset) = find_best_match(&buffered, pos, MAX_MATCH_LENGTH);
        let mut curr_length = found_length;

        // The first emitted byte is always a literal.
        if pos == 2 {
            curr_length = 0;
        }

        // Lazy matching: a sufficiently better match one byte ahead forces
        // a literal here. The adjustment depends on the short/long status
        // of the two candidates.
        if curr_length >= 2 && pos + 1 < buffered.len() {
            let (next_length, next_offset) = find_best_match(&buffered, pos + 1, MAX_MATCH_LENGTH);

            let curr_short = is_short_match(curr_length, curr_offset);
            let next_short = is_short_match(next_length, next_offset);

            let mut adjustment: isize = if curr_short { 2 } else { 1 };
            if curr_short && !next_short && next_length >= 2 {
                adjustment += 2;
            }
            if next_short && !curr_short {
                adjustment -= 1;
            }
            if adjustment < 1 {
                adjustment = 1;
            }
            if curr_short && next_short {
                adjustment = 1;
            }

            if next_length as isize >= curr_length as isize + adjustment {
                curr_length = 0;
            }
        }

        // A match must be strictly cheaper than spelling the bytes out.
        if curr_length >= 2 && match_cost(curr_length, curr_offset) >= 9 * curr_length {
            curr_length = 0;
        }

        if curr_length >= 2 {
            curr_length = optimal_match_length(&buffered, pos, curr_length, curr_offset);
        }

        // Match-follow-match conversion: a length-3 match sandwiched
        // between a previous match token whose first body byte has its two
        // low bits clear and an upcoming match is emitted as three
        // literals instead.
        if curr_length == 3 && state.prev_was_match {
            if let Some(token_pos) = state.prev_token_pos {
                if state.output[token_pos] & 0x03 == 0 && peek_next_decision(&buffered, pos, 3) {
                    for i in 0..3 {
                        state.add_bit(0);
                        let byte = buffered[pos + i];
                        state.output.push(byte);
                    }
                    state.prev_was_match = false;
                    pos += 3;
                    continue;
                }
            }
        }

        if curr_length >= 2 {
            state.add_bit(1);

            if is_short_match(curr_length, curr_offset) {
                state.add_bit(0);
                let len_bits = (curr_length - 2) as u32;
                for i in 0..2 {
                    state.add_bit((len_bits >> i) & 1);
                }
                state.prev_token_pos = Some(state.output.len());
                state.output.push(((curr_offset - 1) & 0xFF) as u8);
            } else {
                state.add_bit(1);
                state.prev_token_pos = Some(state.output.len());

                if curr_length < 10 {
                    let byte1 = (((curr_length - 2) << 5) | (curr_offset & 0x1F)) as u8;
                    let byte2 = ((curr_offset >> 5) & 0xFF) as u8;
                    state.output.push(byte1);
                    state.output.push(byte2);
                } else {
                    let byte1 = (curr_offset & 0x1F) as u8;
                    let byte2 = ((curr_offset >> 5) & 0xFF) as u8;
                    state.output.push(byte1);
                    state.output.push(byte2);

                    // Extension bytes: each 0x00 stands for 255; the final
                    // byte is kept in 1..=255 so the decoder's zero-greedy
                    // scan always stops at the right byte.
                    let mut remaining = curr_length - 9;
                    while remaining > 0xFF {
                        state.output.push(0);
                        remaining -= 0xFF;
                    }
                    state.output.push((remaining & 0xFF) as u8);
                }
            }
            state.prev_was_match = true;
            pos += curr_length;
        } else {
            state.add_bit(0);
            let byte = buffered[pos];
            state.output.push(byte);
            state.prev_was_match = false;
            pos += 1;
        }
    }

    // Terminator: a long-match token with distance 0.
    state.add_bit(1);
    state.add_bit(1);
    state.output.push(0x20);
    state.output.push(0x00);
    state.flush();

    state.output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_roundtrip() {
        assert!(compress(&[]).is_empty());
        assert!(decompress(&[]).is_empty());
    }

    #[test]
    fn roundtrip_simple() {
        let original = b"Hello, World!";
        let compressed = compress(original);
        assert_eq!(decompress(&compressed), original);
    }

    #[test]
    fn roundtrip_repeating_compresses() {
        let original: Vec<u8> = b"ABCD".iter().copied().cycle().take(400).collect();
        let compressed = compress(&original);
        assert_eq!(decompress(&compressed), original);
        assert!(compressed.len() < original.len());
    }

    #[test]
    fn roundtrip_all_byte_values() {
        let original: Vec<u8> = (0u8..=255).collect();
        let compressed = compress(&original);
        assert_eq!(decompress(&compressed), original);
    }

    #[test]
    fn roundtrip_large_mixed() {
        let mut original = Vec::new();
        for i in 0..10_000usize {
            original.push((i % 256) as u8);
            if i % 100 == 0 {
                original.extend_from_slice(b"MARKER");
            }
        }
        let compressed = compress(&original);
        assert_eq!(decompress(&compressed), original);
    }

    #[test]
    fn roundtrip_long_runs() {
        // Runs whose match lengths land on the extended-length encoding,
        // including the multiples-of-255 corner (match length 264).
        for run in [50usize, 265, 266, 520, 1000, 3000] {
            let original = vec![0x41u8; run];
            let compressed = compress(&original);
            assert_eq!(decompress(&compressed), original, "run length {run}");
        }
    }

    #[test]
    fn decode_literal_then_terminator() {
        // Flag bits LSB-first: literal (0), terminator (1, 1).
        let stream = [0x06, 0x41, 0x20, 0x00];
        assert_eq!(decompress(&stream), b"A");
    }

    #[test]
    fn decode_short_match() {
        // Literals 'A' 'B', short match length 2 distance 2, terminator.
        let stream = [0xC4, 0x41, 0x42, 0x01, 0x20, 0x00];
        assert_eq!(decompress(&stream), b"ABAB");
    }

    #[test]
    fn decode_long_match() {
        // Literals 'A' 'B' 'C', long match length 3 distance 3, terminator.
        let stream = [0x78, 0x41, 0x42, 0x43, 0x23, 0x00, 0x20, 0x00];
        assert_eq!(decompress(&stream), b"ABCABC");
    }

    #[test]
    fn decode_extended_length() {
        // Literal 'X', long match distance 1 with extended length 9 + 3.
        let stream = [0x1E, 0x58, 0x01, 0x00, 0x03, 0x20, 0x00];
        assert_eq!(decompress(&stream), vec![0x58u8; 13]);
    }

    #[test]
    fn decode_prefix_reads_produce_zeros() {
        // Short match at output position 0 reaches into the implicit
        // prefix and yields zero bytes.
        let stream = [0x31, 0x01, 0x20, 0x00];
        assert_eq!(decompress(&stream), vec![0u8, 0u8]);
    }

    #[test]
    fn decode_truncated_stream_is_best_effort() {
        let compressed = compress(b"Hello, Hello, Hello!");
        let truncated = &compressed[..compressed.len() / 2];
        // Must not panic; the first decoded byte is still the first literal.
        let out = decompress(truncated);
        assert_eq!(out.first(), Some(&b'H'));
    }

    #[test]
    fn overlapping_copy_expands_runs() {
        let original = b"abcabcabcabcabcabcabcabc";
        let compressed = compress(original);
        assert_eq!(decompress(&compressed), original);
    }

    #[test]
    fn first_token_is_literal() {
        // The encoder always starts with a literal: first flag bit clear,
        // second output byte equals the first input byte.
        let compressed = compress(b"zzzzzzzz");
        assert_eq!(compressed[0] & 1, 0);
        assert_eq!(compressed[1], b'z');
    }
}
