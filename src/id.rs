//! Random unique ids for dispatches and tracked events.
use rand::{thread_rng, Rng};

/// Generate a random id in the UUID v4 textual layout.
pub fn generate() -> String {
    let mut bytes: [u8; 16] = thread_rng().gen();
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    #[test]
    fn generates_unique_uuid_shaped_ids() {
        let ids: HashSet<String> = (0..1000).map(|_| super::generate()).collect();
        assert_eq!(ids.len(), 1000);

        for id in &ids {
            assert_eq!(id.len(), 36);
            assert_eq!(&id[14..15], "4");
            assert_eq!(id.matches('-').count(), 4);
        }
    }
}
