use colloquy::audio::resample::{
    downmix, encode_pcm16, mean_abs_level, pcm16_bytes, FrameConverter,
};

#[test]
fn downmix_averages_interleaved_channels() {
    let stereo = vec![0.5, -0.5, 0.2, -0.2];
    let mono = downmix(&stereo, 2);
    assert_eq!(mono.len(), 2);
    assert!(mono[0].abs() < 1e-6);
    assert!(mono[1].abs() < 1e-6);
}

#[test]
fn downmix_mono_is_identity() {
    let samples = vec![0.1, 0.2, 0.3];
    assert_eq!(downmix(&samples, 1), samples);
    assert!(downmix(&samples, 0).is_empty());
}

#[test]
fn converter_at_wire_rate_is_passthrough() {
    let mut converter = FrameConverter::new(16_000, 320).expect("converter");
    let frame = vec![0.25f32; 320];
    let out = converter.convert(&frame).expect("convert");
    assert_eq!(out, frame);
}

#[test]
fn converter_downsamples_48k_to_roughly_a_third() {
    // 20 ms at 48 kHz in, expect about 20 ms at 16 kHz out. The sinc
    // filter is allowed a little latitude at the edges.
    let mut converter = FrameConverter::new(48_000, 960).expect("converter");
    let frame = vec![0.1f32; 960];
    let out = converter.convert(&frame).expect("convert");
    assert!(
        (280..=360).contains(&out.len()),
        "unexpected output length {}",
        out.len()
    );
}

#[test]
fn encode_pcm16_clamps_out_of_range_samples() {
    let encoded = encode_pcm16(&[0.0, 1.0, -1.0, 2.0, -2.0]);
    assert_eq!(encoded[0], 0);
    assert_eq!(encoded[1], 32767);
    assert_eq!(encoded[3], 32767);
    assert_eq!(encoded[4], -32768);
}

#[test]
fn amplitude_is_normalized_mean_abs() {
    assert_eq!(mean_abs_level(&[]), 0.0);
    assert_eq!(mean_abs_level(&[0, 0, 0]), 0.0);

    let half = mean_abs_level(&[16384, -16384]);
    assert!((half - 0.5).abs() < 0.01);

    let full = mean_abs_level(&[i16::MIN]);
    assert!(full > 0.99);
}

#[test]
fn wire_bytes_are_little_endian() {
    let bytes = pcm16_bytes(&[0x0102, -2]);
    assert_eq!(bytes, vec![0x02, 0x01, 0xFE, 0xFF]);
}
