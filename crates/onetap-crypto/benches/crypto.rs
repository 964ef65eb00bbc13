use onetap_crypto::{decode_key, encode_key, Cipher};

fn make_data(size: usize) -> Vec<u8> {
    (0..size)
        .map(|i| (i.wrapping_mul(7) ^ (i >> 3)) as u8)
        .collect()
}

#[divan::bench(args = [1024, 1048576, 16777216])]
fn bench_encrypt(bencher: divan::Bencher, size: usize) {
    let cipher = Cipher::new();
    let key = cipher.generate().unwrap();
    let data = make_data(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| {
            cipher
                .encrypt(divan::black_box(&data), divan::black_box(&key))
                .unwrap()
        });
}

#[divan::bench(args = [1024, 1048576, 16777216])]
fn bench_decrypt(bencher: divan::Bencher, size: usize) {
    let cipher = Cipher::new();
    let key = cipher.generate().unwrap();
    let data = make_data(size);
    let envelope = cipher.encrypt(&data, &key).unwrap();
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| {
            cipher
                .decrypt(divan::black_box(envelope.as_bytes()), divan::black_box(&key))
                .unwrap()
        });
}

#[divan::bench]
fn bench_key_text_roundtrip(bencher: divan::Bencher) {
    let key = Cipher::new().generate().unwrap();
    bencher.bench(|| decode_key(&encode_key(divan::black_box(&key))).unwrap());
}

fn main() {
    divan::main();
}
