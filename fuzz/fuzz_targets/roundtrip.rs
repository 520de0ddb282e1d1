#![no_main]

use {
    arbitrary::Arbitrary,
    bitwire::{BitMeasurer, BitReader, BitWriter},
    libfuzzer_sys::fuzz_target,
};

#[derive(Arbitrary, Debug)]
enum Op {
    U8 { value: u8, a: u8, b: u8 },
    U32 { value: u32, a: u32, b: u32 },
    U64 { value: u64, a: u64, b: u64 },
    I64 { value: i64, a: i64, b: i64 },
    Bool(bool),
    F32(f32),
    F64(f64),
    Bytes(Vec<u8>),
    Str(String),
    Utf16(Vec<u16>),
}

/// Normalize an arbitrary `(value, a, b)` triple into `(value, min, max)`
/// with `min <= value <= max` and `min < max`.
macro_rules! normalize {
    ($ty:ty, $value:expr, $a:expr, $b:expr) => {{
        let mut sorted = [$value, $a, $b];
        sorted.sort_unstable();
        let [mut lo, value, mut hi] = sorted;
        if lo == hi {
            if hi == <$ty>::MAX {
                lo -= 1;
            } else {
                hi += 1;
            }
        }
        (value, lo, hi)
    }};
}

fuzz_target!(|ops: Vec<Op>| {
    // First pass: measure, so the buffer fits exactly.
    let mut measurer = BitMeasurer::new();
    for op in &ops {
        match op {
            Op::U8 { value, a, b } => {
                let (value, lo, hi) = normalize!(u8, *value, *a, *b);
                measurer.write(value, lo, hi);
            }
            Op::U32 { value, a, b } => {
                let (value, lo, hi) = normalize!(u32, *value, *a, *b);
                measurer.write(value, lo, hi);
            }
            Op::U64 { value, a, b } => {
                let (value, lo, hi) = normalize!(u64, *value, *a, *b);
                measurer.write(value, lo, hi);
            }
            Op::I64 { value, a, b } => {
                let (value, lo, hi) = normalize!(i64, *value, *a, *b);
                measurer.write(value, lo, hi);
            }
            Op::Bool(value) => {
                measurer.write_bool(*value);
            }
            Op::F32(value) => {
                measurer.write_f32(*value);
            }
            Op::F64(value) => {
                measurer.write_f64(*value);
            }
            Op::Bytes(bytes) => {
                measurer.write_bytes(bytes);
            }
            Op::Str(string) => {
                measurer.write_string(string);
            }
            Op::Utf16(units) => {
                measurer.write_utf16_string(units);
            }
        }
    }

    let logical_bytes = (measurer.used_bytes() as usize).max(1);
    if logical_bytes > 1 << 20 {
        return;
    }
    let mut words = vec![0u32; logical_bytes.div_ceil(4)];

    // Second pass: write for real.
    let mut writer = BitWriter::new(&mut words, logical_bytes);
    for op in &ops {
        match op {
            Op::U8 { value, a, b } => {
                let (value, lo, hi) = normalize!(u8, *value, *a, *b);
                writer.write(value, lo, hi);
            }
            Op::U32 { value, a, b } => {
                let (value, lo, hi) = normalize!(u32, *value, *a, *b);
                writer.write(value, lo, hi);
            }
            Op::U64 { value, a, b } => {
                let (value, lo, hi) = normalize!(u64, *value, *a, *b);
                writer.write(value, lo, hi);
            }
            Op::I64 { value, a, b } => {
                let (value, lo, hi) = normalize!(i64, *value, *a, *b);
                writer.write(value, lo, hi);
            }
            Op::Bool(value) => {
                writer.write_bool(*value);
            }
            Op::F32(value) => {
                writer.write_f32(*value);
            }
            Op::F64(value) => {
                writer.write_f64(*value);
            }
            Op::Bytes(bytes) => {
                writer.write_bytes(bytes);
            }
            Op::Str(string) => {
                writer.write_string(string);
            }
            Op::Utf16(units) => {
                writer.write_utf16_string(units);
            }
        }
    }
    writer.flush_final();
    assert!(!writer.fail(), "a measured write sequence must fit");
    let total_bits = writer.used_bits();
    assert_eq!(total_bits, measurer.used_bits());

    // Third pass: read everything back and compare.
    let used_bytes = writer.used_bytes() as usize;
    let mut reader = BitReader::new(&words, used_bytes.max(1));
    for op in &ops {
        match op {
            Op::U8 { value, a, b } => {
                let (value, lo, hi) = normalize!(u8, *value, *a, *b);
                assert_eq!(reader.read(lo, hi), value);
            }
            Op::U32 { value, a, b } => {
                let (value, lo, hi) = normalize!(u32, *value, *a, *b);
                assert_eq!(reader.read(lo, hi), value);
            }
            Op::U64 { value, a, b } => {
                let (value, lo, hi) = normalize!(u64, *value, *a, *b);
                assert_eq!(reader.read(lo, hi), value);
            }
            Op::I64 { value, a, b } => {
                let (value, lo, hi) = normalize!(i64, *value, *a, *b);
                assert_eq!(reader.read(lo, hi), value);
            }
            Op::Bool(value) => {
                assert_eq!(reader.read_bool(), *value);
            }
            Op::F32(value) => {
                assert_eq!(reader.read_f32().to_bits(), value.to_bits());
            }
            Op::F64(value) => {
                assert_eq!(reader.read_f64().to_bits(), value.to_bits());
            }
            Op::Bytes(bytes) => {
                let mut out = vec![0u8; bytes.len()];
                reader.read_bytes(&mut out);
                assert_eq!(&out, bytes);
            }
            Op::Str(string) => {
                let mut out = String::new();
                reader.read_string(&mut out, string.len());
                assert_eq!(&out, string);
            }
            Op::Utf16(units) => {
                let mut out = Vec::new();
                reader.read_utf16_string(&mut out, units.len());
                assert_eq!(&out, units);
            }
        }
    }
    assert!(!reader.fail());
    assert_eq!(reader.used_bits(), total_bits);
});
