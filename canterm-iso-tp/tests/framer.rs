use canterm_interface::Error;
use canterm_iso_tp::{decode_payload, encode_payload, MAX_FRAMES, MAX_PAYLOAD};

#[test]
fn round_trip_across_representative_lengths() {
    for len in [1usize, 2, 6, 7, 8, 13, 62, 100, 1000, 4094, 4095] {
        let payload: Vec<u8> = (0..len).map(|i| (i % 253) as u8).collect();
        let encoded = encode_payload(&payload).unwrap();
        assert_eq!(decode_payload(&encoded).unwrap(), payload, "len={len}");
    }
}

#[test]
fn payloads_up_to_seven_bytes_are_single_frames() {
    for len in 1usize..=7 {
        let payload = vec![0xA5; len];
        let encoded = encode_payload(&payload).unwrap();
        assert_eq!(encoded.len(), len + 1, "len={len}");
        assert_eq!(encoded[0] as usize, len);
    }
}

#[test]
fn maximum_payload_frame_budget() {
    let payload = vec![0x11; MAX_PAYLOAD];
    let encoded = encode_payload(&payload).unwrap();

    // First frame (2 + 6 bytes), 584 full consecutive frames (1 + 7 bytes)
    // and one final consecutive frame carrying a single byte.
    assert_eq!(encoded.len(), 8 + 584 * 8 + 2);
    assert_eq!(encoded[0], 0x1F);
    assert_eq!(encoded[1], 0xFF);

    // Walk the consecutive-frame chain and count frames.
    let mut frames = 1;
    let mut index = 8;
    let mut remaining = MAX_PAYLOAD - 6;
    while remaining > 0 {
        let take = remaining.min(7);
        assert_eq!(encoded[index] & 0xF0, 0x20);
        frames += 1;
        index += 1 + take;
        remaining -= take;
    }
    assert_eq!(frames, MAX_FRAMES);
    assert_eq!(index, encoded.len());
}

#[test]
fn sequence_numbers_wrap_in_encoded_form() {
    // 6 + 16 * 7 = 118 bytes exercises the 0x2F -> 0x20 wrap.
    let payload = vec![0x00; 150];
    let encoded = encode_payload(&payload).unwrap();

    let mut pcis = Vec::new();
    let mut index = 8;
    let mut remaining = payload.len() - 6;
    while remaining > 0 {
        let take = remaining.min(7);
        pcis.push(encoded[index]);
        index += 1 + take;
        remaining -= take;
    }
    assert_eq!(pcis[13], 0x2E);
    assert_eq!(pcis[14], 0x2F);
    assert_eq!(pcis[15], 0x20);
    assert_eq!(pcis[16], 0x21);
    assert!(pcis.iter().all(|&pci| pci != 0x30));
}

#[test]
fn bounds_and_malformed_input() {
    assert_eq!(encode_payload(&[]), Err(Error::MessageTooSmall));
    assert_eq!(
        encode_payload(&vec![0u8; MAX_PAYLOAD + 1]),
        Err(Error::MessageTooBig)
    );

    // A multi-frame buffer must open with a first frame.
    let payload: Vec<u8> = (0u8..20).collect();
    let mut encoded = encode_payload(&payload).unwrap();
    encoded[0] = 0x20;
    assert!(matches!(decode_payload(&encoded), Err(Error::Decoder(_))));
}
