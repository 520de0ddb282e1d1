#![no_main]

use {
    arbitrary::Arbitrary,
    bitwire::BitReader,
    libfuzzer_sys::fuzz_target,
};

#[derive(Arbitrary, Debug)]
struct Input {
    words: Vec<u32>,
    logical_bytes: u16,
    reads: Vec<Read>,
}

#[derive(Arbitrary, Debug)]
enum Read {
    U8 { a: u8, b: u8 },
    U32 { a: u32, b: u32 },
    I64 { a: i64, b: i64 },
    Bool,
    F32,
    F64,
    Bytes(u8),
    Str(u16),
    Utf16(u16),
    Utf32(u16),
    PeekLength,
}

// Arbitrary word soup must never panic the reader, and consumption must
// never pass the logical end.
fuzz_target!(|input: Input| {
    let Input {
        words,
        logical_bytes,
        reads,
    } = input;

    let mut reader = BitReader::new(&words, logical_bytes as usize);
    for read in reads {
        match read {
            Read::U8 { a, b } => {
                let value = reader.read(a.min(b), a.max(b));
                if !reader.fail() {
                    assert!(value >= a.min(b) && value <= a.max(b));
                }
            }
            Read::U32 { a, b } => {
                let value = reader.read(a.min(b), a.max(b));
                if !reader.fail() {
                    assert!(value >= a.min(b) && value <= a.max(b));
                }
            }
            Read::I64 { a, b } => {
                let value = reader.read(a.min(b), a.max(b));
                if !reader.fail() {
                    assert!(value >= a.min(b) && value <= a.max(b));
                }
            }
            Read::Bool => {
                reader.read_bool();
            }
            Read::F32 => {
                reader.read_f32();
            }
            Read::F64 => {
                reader.read_f64();
            }
            Read::Bytes(len) => {
                let mut out = vec![0u8; len as usize];
                reader.read_bytes(&mut out);
            }
            Read::Str(max_length) => {
                let mut out = String::new();
                reader.read_string(&mut out, max_length as usize);
            }
            Read::Utf16(max_length) => {
                let mut out = Vec::new();
                reader.read_utf16_string(&mut out, max_length as usize);
            }
            Read::Utf32(max_length) => {
                let mut out = Vec::new();
                reader.read_utf32_string(&mut out, max_length as usize);
            }
            Read::PeekLength => {
                let peeked = reader.peek_string_length();
                if reader.fail() {
                    assert!(peeked < 0);
                }
            }
        }
        assert!(reader.used_bits() <= reader.total_bits());
    }
});
