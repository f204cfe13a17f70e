#![no_main]

use libfuzzer_sys::fuzz_target;
use mcp_sql_fuzz::schema::parse_catalog;
use mcp_sql_fuzz::{Reply, codec};

fuzz_target!(|data: &[u8]| {
    match codec::decode_line(data) {
        Ok(decoded) => {
            if let Reply::Success(payload) = decoded.reply {
                let _ = payload.summary();
                if let Some(schemas) = payload.extra("schemas") {
                    let _ = parse_catalog(schemas);
                }
            }
        }
        // A line that arrived but made no sense must classify as a decode failure.
        Err(e) => assert!(e.is_decode(), "{e:?}"),
    }

    let Ok(line) = std::str::from_utf8(data) else {
        return;
    };

    // Re-framing must never let a line break through.
    if let Ok(framed) = codec::frame(line.to_string()) {
        assert_eq!(framed.matches('\n').count(), 1);
        assert!(framed.ends_with('\n'));
    }
});
