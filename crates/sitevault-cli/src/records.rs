use std::{collections::BTreeMap, path::Path};

use color_eyre::Result;
use serde_json::{json, Value};
use sitevault_core::{
    envelope::{Codec, PlainValue},
    storage::RecordStore,
};
use sitevault_site::{DecryptedRecord, SealedStore};
use sitevault_storage::sealed_file::{open_file, seal_file};

/// Seal a command-line argument; `--json` parses it first.
pub fn encrypt(codec: &Codec, text: String, as_json: bool) -> Result<String> {
    let value = if as_json {
        PlainValue::Json(serde_json::from_str(&text)?)
    } else {
        PlainValue::Text(text)
    };
    Ok(codec.encrypt(&value)?)
}

pub fn decrypt(codec: &Codec, envelope: &str) -> Result<String> {
    render(codec.decrypt(envelope)?)
}

pub fn encrypt_file(codec: &Codec, input: &Path, output: &Path) -> Result<()> {
    seal_file(codec, input, output)?;
    println!("Encrypted {} -> {}", input.display(), output.display());
    Ok(())
}

pub fn decrypt_file(codec: &Codec, path: &Path) -> Result<String> {
    render(open_file(codec, path)?)
}

/// Text prints as-is; everything else as pretty JSON.
pub fn render(value: PlainValue) -> Result<String> {
    Ok(match value {
        PlainValue::Text(text) => text,
        other => serde_json::to_string_pretty(&other.into_json())?,
    })
}

/// Decrypt every record in the backend into one JSON object keyed by id.
pub async fn export(sealed: &SealedStore<dyn RecordStore>) -> Result<String> {
    let records = sealed.get_all().await?;
    Ok(serde_json::to_string_pretty(&export_json(records))?)
}

fn export_json(records: BTreeMap<String, DecryptedRecord>) -> Value {
    let entries = records
        .into_iter()
        .map(|(id, record)| {
            let entry = json!({
                "data": record.data.into_json(),
                "type": record.data_type,
                "created": record.created.map(|t| t.to_rfc3339()),
                "modified": record.modified.map(|t| t.to_rfc3339()),
            });
            (id, entry)
        })
        .collect();
    Value::Object(entries)
}

#[cfg(test)]
mod tests {
    use std::{fs, sync::Arc};

    use sitevault_core::storage::InMemoryRecordStore;

    use super::*;
    use crate::storage::test_codec;

    #[test]
    fn encrypt_then_decrypt_text_and_json() {
        let codec = test_codec();
        let envelope = encrypt(&codec, "Hello, World!".into(), false).expect("encrypt");
        assert_eq!(decrypt(&codec, &envelope).expect("decrypt"), "Hello, World!");

        let envelope = encrypt(&codec, r#"{"theme":"dark"}"#.into(), true).expect("encrypt json");
        let shown = decrypt(&codec, &envelope).expect("decrypt json");
        let parsed: Value = serde_json::from_str(&shown).expect("pretty json");
        assert_eq!(parsed, json!({"theme": "dark"}));
    }

    #[test]
    fn json_flag_rejects_invalid_json() {
        assert!(encrypt(&test_codec(), "{not json".into(), true).is_err());
    }

    #[test]
    fn file_commands_round_trip() {
        let codec = test_codec();
        let dir = tempfile::tempdir().expect("tempdir");
        let input = dir.path().join("notes.txt");
        let output = dir.path().join("notes.enc");
        fs::write(&input, "meet at noon").expect("write input");

        encrypt_file(&codec, &input, &output).expect("encrypt file");
        assert!(!fs::read_to_string(&output).unwrap().contains("noon"));
        assert_eq!(decrypt_file(&codec, &output).expect("decrypt file"), "meet at noon");
    }

    #[test]
    fn bytes_render_as_base64_json_string() {
        let shown = render(PlainValue::Bytes(vec![0xff, 0xfe])).expect("render");
        assert_eq!(shown, "\"//4=\"");
    }

    #[tokio::test]
    async fn export_includes_every_record() {
        let store: Arc<dyn RecordStore> = Arc::new(InMemoryRecordStore::new());
        let sealed = SealedStore::new(test_codec(), store);
        sealed
            .store("site_config", json!({"name": "Demo"}).into(), Some("config".into()))
            .await
            .expect("store");
        sealed
            .store("motd", "hello".into(), None)
            .await
            .expect("store");

        let exported: Value =
            serde_json::from_str(&export(&sealed).await.expect("export")).expect("json");
        assert_eq!(exported["site_config"]["data"], json!({"name": "Demo"}));
        assert_eq!(exported["site_config"]["type"], "config");
        assert_eq!(exported["motd"]["data"], "hello");
        assert!(exported["motd"]["created"].is_string());
    }
}
