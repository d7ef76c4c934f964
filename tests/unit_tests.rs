/*!
 * Unit tests for Persistor core functionality
 * Tests that don't require a running server
 */

use persistor::*;
use anyhow::Result;
use bson::{doc, Bson};

#[test]
fn test_config_defaults() -> Result<()> {
    let config = Config::default();

    assert_eq!(config.driver.backend, "mongodb");
    assert_eq!(config.driver.db_name, "default_db");
    assert_eq!(config.driver.host, "127.0.0.1");
    assert_eq!(config.driver.port, 27017);
    assert_eq!(config.driver.max_pool_size, 100);
    assert_eq!(config.driver.min_pool_size, 0);
    assert_eq!(config.driver.connect_timeout_ms, 10000);
    assert_eq!(config.driver.auth_source, "admin");
    assert!(!config.driver.use_object_id);
    assert!(config.driver.connection_string.is_none());

    // Test that we can serialize and deserialize the config
    let serialized = serde_json::to_string(&config)?;
    let deserialized: Config = serde_json::from_str(&serialized)?;
    assert_eq!(config.server.port, deserialized.server.port);
    assert_eq!(config.driver.db_name, deserialized.driver.db_name);

    let as_toml = toml::to_string_pretty(&config)?;
    let from_toml: Config = toml::from_str(&as_toml)?;
    assert_eq!(config.driver.max_pool_size, from_toml.driver.max_pool_size);

    Ok(())
}

#[tokio::test]
async fn test_config_load_creates_default_in_missing_directory() {
    let root = std::env::temp_dir().join(format!("persistor-cfg-{}", std::process::id()));
    let _ = tokio::fs::remove_dir_all(&root).await;
    let path = root.join("config").join("persistor.toml");

    // First load writes the default file, creating directories as needed
    let config = Config::load(&path).await.unwrap();
    assert!(path.exists());
    assert_eq!(config.driver.db_name, "default_db");

    // Second load reads the file back
    let reloaded = Config::load(&path).await.unwrap();
    assert_eq!(reloaded.server.port, config.server.port);

    tokio::fs::remove_dir_all(&root).await.unwrap();
}

#[test]
fn test_error_handling() {
    // Protocol, argument, and store errors display their message verbatim;
    // the store message is what failure replies carry.
    let protocol = PersistorError::Protocol("action not specified".to_string());
    assert_eq!(protocol.to_string(), "action not specified");

    let argument = PersistorError::Argument("field 'limit' must be an integer".to_string());
    assert_eq!(argument.to_string(), "field 'limit' must be an integer");

    let store = PersistorError::Store("E11000 duplicate key error".to_string());
    assert_eq!(store.to_string(), "E11000 duplicate key error");

    let config = PersistorError::Config("bad file".to_string());
    assert!(config.to_string().contains("bad file"));
}

#[test]
fn test_log_level_display() {
    use persistor::logger::LogLevel;

    assert_eq!(LogLevel::Debug.to_string(), "DEBUG");
    assert_eq!(LogLevel::Info.to_string(), "INFO ");
    assert_eq!(LogLevel::Warning.to_string(), "WARN ");
    assert_eq!(LogLevel::Error.to_string(), "ERROR");
}

#[test]
fn test_connection_tracker() {
    use persistor::logger::ConnectionTracker;

    let tracker = ConnectionTracker::new(2);
    tracker.add_connection(1, "127.0.0.1:50001".to_string()).unwrap();
    tracker.add_connection(2, "127.0.0.1:50002".to_string()).unwrap();
    assert_eq!(tracker.get_connection_count(), 2);

    // The cap refuses further connections
    let refused = tracker.add_connection(3, "127.0.0.1:50003".to_string());
    assert!(refused.unwrap_err().contains("Maximum connections"));

    tracker.update_activity(1, 64, 128);
    tracker.increment_requests(1);
    let info = tracker.get_connection_info(1).unwrap();
    assert_eq!(info.client_addr, "127.0.0.1:50001");
    assert_eq!(info.bytes_received, 64);
    assert_eq!(info.bytes_sent, 128);
    assert_eq!(info.requests_dispatched, 1);

    // Removed connections disappear from the tracker
    tracker.remove_connection(1);
    assert!(tracker.get_connection_info(1).is_none());
    assert_eq!(tracker.get_connection_count(), 1);
}

#[test]
fn test_write_option_parsing() {
    let cases = [
        ("ACKNOWLEDGED", WriteOption::Acknowledged),
        ("UNACKNOWLEDGED", WriteOption::Unacknowledged),
        ("FSYNCED", WriteOption::Fsynced),
        ("JOURNALED", WriteOption::Journaled),
        ("REPLICA_ACKNOWLEDGED", WriteOption::ReplicaAcknowledged),
        ("MAJORITY", WriteOption::Majority),
    ];

    for (name, expected) in cases {
        let parsed: WriteOption = name.parse().unwrap();
        assert_eq!(parsed, expected);
        assert_eq!(parsed.as_str(), name);
    }

    // Names are matched case-exactly
    assert!("majority".parse::<WriteOption>().is_err());
    assert!("Acknowledged".parse::<WriteOption>().is_err());

    let err = "SAFE".parse::<WriteOption>().unwrap_err();
    assert!(err.to_string().contains("unknown write option 'SAFE'"));
}

#[test]
fn test_find_options_defaults() -> Result<()> {
    let options = FindOptions::from_document(None)?;
    assert!(options.fields.is_none());
    assert!(options.sort.is_none());
    assert_eq!(options.limit, -1);
    assert_eq!(options.skip, 0);

    // An empty sub-document behaves like an absent one
    let options = FindOptions::from_document(Some(&doc! {}))?;
    assert_eq!(options, FindOptions::default());

    Ok(())
}

#[test]
fn test_find_options_from_document() -> Result<()> {
    let raw = doc! {
        "fields": { "num": true },
        "sort": { "foo": 1 },
        "limit": 10,
        "skip": 2,
    };
    let options = FindOptions::from_document(Some(&raw))?;
    assert_eq!(options.fields, Some(doc! { "num": true }));
    assert_eq!(options.sort, Some(doc! { "foo": 1 }));
    assert_eq!(options.limit, 10);
    assert_eq!(options.skip, 2);

    // Keys not present keep their defaults
    let partial = FindOptions::from_document(Some(&doc! { "limit": 5 }))?;
    assert_eq!(partial.limit, 5);
    assert_eq!(partial.skip, 0);
    assert!(partial.sort.is_none());

    Ok(())
}

#[test]
fn test_find_options_rejects_bad_types() {
    let err = FindOptions::from_document(Some(&doc! { "limit": "ten" })).unwrap_err();
    assert!(err.to_string().contains("'limit'"));

    let err = FindOptions::from_document(Some(&doc! { "sort": 1 })).unwrap_err();
    assert!(err.to_string().contains("'sort'"));
}

#[test]
fn test_update_options_from_document() -> Result<()> {
    let options = UpdateOptions::from_document(None)?;
    assert!(!options.multi);
    assert!(!options.upsert);
    assert!(options.write_option.is_none());

    let raw = doc! { "multi": true, "upsert": true, "writeOption": "MAJORITY" };
    let options = UpdateOptions::from_document(Some(&raw))?;
    assert!(options.multi);
    assert!(options.upsert);
    assert_eq!(options.write_option, Some(WriteOption::Majority));

    let err = UpdateOptions::from_document(Some(&doc! { "writeOption": "BOGUS" })).unwrap_err();
    assert!(err.to_string().contains("unknown write option"));

    let err = UpdateOptions::from_document(Some(&doc! { "multi": "yes" })).unwrap_err();
    assert!(err.to_string().contains("'multi'"));

    Ok(())
}

#[test]
fn test_request_envelope_json() -> Result<()> {
    let request = Request::new("insert", doc! { "collection": "books", "document": { "title": "Dune" } });
    assert_eq!(request.action(), Some("insert"));

    let frame = request.to_json()?;
    let parsed = Request::from_json(&frame)?;
    assert_eq!(parsed, request);

    // Missing headers leave the action unset
    let bare = Request::from_json(r#"{"body": {}}"#)?;
    assert_eq!(bare.action(), None);
    assert!(bare.body.is_empty());

    // Non-object frames are envelope errors
    assert!(Request::from_json("[1, 2]").is_err());
    assert!(Request::from_json(r#"{"headers": {"action": 5}}"#).is_err());

    Ok(())
}

#[test]
fn test_reply_envelope_json() -> Result<()> {
    let reply = Reply::success(Bson::String("abc123".to_string()));
    let frame = reply.to_json()?;
    assert_eq!(Reply::from_json(&frame)?, reply);

    let empty = Reply::empty();
    let frame = empty.to_json()?;
    assert_eq!(Reply::from_json(&frame)?, Reply::Success(Bson::Null));

    let failure = Reply::failure("it broke");
    assert!(failure.is_failure());
    let frame = failure.to_json()?;
    match Reply::from_json(&frame)? {
        Reply::Failure { code, message } => {
            assert_eq!(code, FAILURE_CODE);
            assert_eq!(code, -1);
            assert_eq!(message, "it broke");
        }
        Reply::Success(_) => panic!("expected a failure reply"),
    }

    Ok(())
}

#[test]
fn test_extended_json_date_survives() -> Result<()> {
    let frame = r#"{"headers": {"action": "insert"}, "body": {"document": {"when": {"$date": {"$numberLong": "100100"}}}}}"#;
    let request = Request::from_json(frame)?;

    let document = request.body.get_document("document")?;
    match document.get("when") {
        Some(Bson::DateTime(dt)) => assert_eq!(dt.timestamp_millis(), 100100),
        other => panic!("expected a BSON datetime, got {:?}", other),
    }

    // And back out through a reply frame
    let reply = Reply::success(Bson::Document(document.clone()));
    let encoded = reply.to_json()?;
    let decoded = Reply::from_json(&encoded)?;
    match decoded {
        Reply::Success(Bson::Document(doc)) => match doc.get("when") {
            Some(Bson::DateTime(dt)) => assert_eq!(dt.timestamp_millis(), 100100),
            other => panic!("expected a BSON datetime, got {:?}", other),
        },
        other => panic!("expected a success reply, got {:?}", other),
    }

    Ok(())
}

#[test]
fn test_bson_serialization() -> Result<()> {
    // Test that we can create and serialize BSON documents
    let doc = doc! {
        "name": "test",
        "value": 42,
        "nested": {
            "array": [1, 2, 3],
            "boolean": true
        }
    };

    let serialized = bson::to_vec(&doc)?;
    assert!(!serialized.is_empty());

    let deserialized: bson::Document = bson::from_slice(&serialized)?;
    assert_eq!(deserialized.get_str("name").unwrap(), "test");
    assert_eq!(deserialized.get_i32("value").unwrap(), 42);

    Ok(())
}
