/// `data_coding` value for UCS-2 / UTF-16BE.
pub const DATA_CODING_UCS2: u8 = 0x08;

/// Decode `short_message` bytes to text.
///
/// UCS-2 messages are decoded as UTF-16BE (a dangling odd byte is dropped).
/// Everything else is treated as UTF-8, which covers the GSM default alphabet
/// for plain ASCII. Undecodable input falls back to Latin-1 so no message is
/// lost.
pub fn decode_short_message(bytes: &[u8], data_coding: u8) -> String {
    if data_coding == DATA_CODING_UCS2 {
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16(&units).unwrap_or_else(|_| latin1(bytes));
    }

    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => latin1(bytes),
    }
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|b| char::from(*b)).collect()
}
