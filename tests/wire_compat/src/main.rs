fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use base64::Engine;
    use nofile_protocol::envelope::BASE64_URL;
    use nofile_protocol::{
        DownloadChunkMeta, DownloadRequest, DownloadResponse, EndedRequest, UploadAck,
        UploadChunkMeta, decode_frame, encode_frame,
    };
    use nofile_transfer::{
        SecretKey, TransferKey, decrypt_chunk, derive_nonce, encrypt_chunk, key_from_link,
    };

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    fn read_fixture(name: &str) -> String {
        let path = fixtures_dir().join(name);
        fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()))
    }

    /// Loads a fixture JSON file and returns it as a `serde_json::Value`.
    fn load_fixture(name: &str) -> serde_json::Value {
        serde_json::from_str(&read_fixture(name))
            .unwrap_or_else(|e| panic!("failed to parse fixture {name}: {e}"))
    }

    fn b64(value: &serde_json::Value) -> Vec<u8> {
        BASE64_URL.decode(value.as_str().unwrap()).unwrap()
    }

    /// Deserializes a fixture into a Rust type, re-serializes it, and compares
    /// the JSON values (order-independent).
    fn roundtrip_test<T>(name: &str) -> T
    where
        T: serde::de::DeserializeOwned + serde::Serialize,
    {
        let fixture = load_fixture(name);
        let parsed: T = serde_json::from_value(fixture.clone())
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"));
        let reserialized = serde_json::to_value(&parsed)
            .unwrap_or_else(|e| panic!("failed to re-serialize {name}: {e}"));
        assert_eq!(
            fixture, reserialized,
            "roundtrip mismatch for {name}:\n  wire: {fixture}\n  Rust: {reserialized}"
        );
        parsed
    }

    // --- Record fixtures ---

    #[test]
    fn fixture_upload_chunk_meta() {
        let meta = roundtrip_test::<UploadChunkMeta>("upload_chunk_meta.json");
        assert_eq!(meta.content_type, "video/x-matroska");
        assert_eq!(meta.id, None);
        assert_eq!(meta.file_pwd.as_deref(), Some("hunter2"));
    }

    #[test]
    fn fixture_upload_ack() {
        let ack = roundtrip_test::<UploadAck>("upload_ack.json");
        assert!(ack.success);
        assert_eq!(ack.j, Some(2));
        assert_eq!(ack.short.as_deref(), Some("aZ9"));
    }

    #[test]
    fn fixture_upload_ack_rejected() {
        let ack = roundtrip_test::<UploadAck>("upload_ack_rejected.json");
        assert!(!ack.success);
        assert_eq!(ack.msg.as_deref(), Some("file too large"));
    }

    #[test]
    fn fixture_download_request() {
        roundtrip_test::<DownloadRequest>("download_request.json");
    }

    #[test]
    fn fixture_ended_request() {
        let ended = roundtrip_test::<EndedRequest>("ended_request.json");
        assert_eq!(ended, EndedRequest::new(None));
    }

    #[test]
    fn fixture_download_chunk_meta() {
        roundtrip_test::<DownloadChunkMeta>("download_chunk_meta.json");
    }

    #[test]
    fn fixture_download_rejection() {
        let meta = roundtrip_test::<DownloadChunkMeta>("download_rejection.json");
        assert_eq!(meta.msg.as_deref(), Some("password required"));
        assert_eq!(meta.part, None);
    }

    // --- Legacy records: fields older servers leave out ---

    #[test]
    fn legacy_upload_meta_without_zipped() {
        let json = r#"{
            "total": 1,
            "part": 0,
            "size": 5,
            "name": "a.txt",
            "type": "text/plain",
            "delay": 0,
            "del_at_first_view": true,
            "id": "aZ9",
            "i": 3
        }"#;
        let meta: UploadChunkMeta = serde_json::from_str(json).unwrap();
        assert!(!meta.zipped, "missing zipped should default to false");
        assert_eq!(meta.file_pwd, None);
    }

    #[test]
    fn legacy_ack_without_success_is_a_rejection() {
        let ack: UploadAck = serde_json::from_str(r#"{"msg": "server busy"}"#).unwrap();
        assert!(!ack.success, "missing success should default to false");
        assert_eq!(ack.i, None);
    }

    // --- Frames ---

    #[test]
    fn download_frame_decodes_and_decrypts() {
        let frame = read_fixture("download_frame.txt");
        let vector = load_fixture("codec_vector.json");

        let resp = DownloadResponse::parse(frame.trim_end()).unwrap();
        assert_eq!(resp.meta, serde_json::from_value(load_fixture("download_chunk_meta.json")).unwrap());
        let payload = resp.payload.expect("frame carries a payload");
        payload.check_alg().unwrap();
        assert_eq!(payload.iv, b64(&vector["nonce"]));

        let key = SecretKey::from_encoded(vector["key"].as_str().unwrap()).unwrap();
        let plaintext = decrypt_chunk(&key, &payload.iv, &payload.ct).unwrap();
        assert_eq!(plaintext, vector["plaintext"].as_str().unwrap().as_bytes());
    }

    #[test]
    fn frame_reencodes_byte_for_byte() {
        let frame = read_fixture("download_frame.txt");
        let frame = frame.trim_end();
        let (meta, payload) = decode_frame::<DownloadChunkMeta>(frame).unwrap();
        assert_eq!(encode_frame(&meta, payload.as_ref()).unwrap(), frame);
    }

    // --- Codec vector ---

    #[test]
    fn codec_vector_matches_reference_cipher() {
        let vector = load_fixture("codec_vector.json");
        let key: [u8; 32] = b64(&vector["key"]).try_into().unwrap();
        let base: [u8; 12] = b64(&vector["baseNonce"]).try_into().unwrap();
        let index = vector["index"].as_u64().unwrap() as u32;

        assert_eq!(derive_nonce(&base, index).to_vec(), b64(&vector["nonce"]));

        let sealed = encrypt_chunk(
            &TransferKey::from_parts(key, base),
            index,
            vector["plaintext"].as_str().unwrap().as_bytes(),
        )
        .unwrap();
        assert_eq!(sealed.ciphertext, b64(&vector["ct"]));
    }

    #[test]
    fn link_fragment_carries_the_vector_key() {
        let vector = load_fixture("codec_vector.json");
        let encoded = vector["key"].as_str().unwrap();
        let link = format!("https://files.example/r/aZ9#{encoded}&lang=en");
        let key = key_from_link(&link).unwrap();
        assert_eq!(key.as_bytes().to_vec(), b64(&vector["key"]));
        assert_eq!(key.encode(), encoded);
    }
}
