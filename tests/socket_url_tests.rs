use colloquy::net::socket::streaming_url;

#[test]
fn http_base_becomes_ws() {
    assert_eq!(
        streaming_url("http://localhost:8080").expect("url"),
        "ws://localhost:8080/v1/voice/ws"
    );
}

#[test]
fn https_base_becomes_wss() {
    assert_eq!(
        streaming_url("https://voice.example.com").expect("url"),
        "wss://voice.example.com/v1/voice/ws"
    );
}

#[test]
fn bare_host_gets_plain_scheme() {
    assert_eq!(
        streaming_url("192.168.1.10:8080").expect("url"),
        "ws://192.168.1.10:8080/v1/voice/ws"
    );
}

#[test]
fn trailing_slash_does_not_double_up() {
    assert_eq!(
        streaming_url("http://localhost:8080/").expect("url"),
        "ws://localhost:8080/v1/voice/ws"
    );
}

#[test]
fn existing_path_prefix_is_preserved() {
    assert_eq!(
        streaming_url("https://gateway.example.com/api").expect("url"),
        "wss://gateway.example.com/api/v1/voice/ws"
    );
}

#[test]
fn ws_scheme_passes_through() {
    assert_eq!(
        streaming_url("ws://localhost:9000").expect("url"),
        "ws://localhost:9000/v1/voice/ws"
    );
}

#[test]
fn surrounding_whitespace_is_trimmed() {
    assert_eq!(
        streaming_url("  http://localhost:8080  ").expect("url"),
        "ws://localhost:8080/v1/voice/ws"
    );
}

#[test]
fn empty_and_bad_addresses_are_rejected() {
    assert!(streaming_url("").is_err());
    assert!(streaming_url("   ").is_err());
    assert!(streaming_url("ftp://host").is_err());
}
