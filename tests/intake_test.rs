use binlog_indexer::config::SourceTables;
use binlog_indexer::event::{Action, ChangeEvent, PositionMarker, SyncMessage};
use binlog_indexer::filters::SourceFilter;
use binlog_indexer::intake::{self, Intake};
use binlog_indexer::shutdown::Shutdown;
use binlog_source::{ColumnValue, EventHandler, Position, ReplayFeed, RowAction, RowsNotification};
use tokio::io::BufReader;
use tokio::sync::mpsc;

fn tracked() -> SourceFilter {
    SourceFilter::new(&[SourceTables {
        schema: "shop".to_string(),
        tables: vec!["items".to_string()],
    }])
    .unwrap()
}

fn setup() -> (Intake, mpsc::Receiver<SyncMessage>) {
    let (tx, rx) = intake::queue(64);
    (Intake::new(tx, tracked(), Shutdown::new()), rx)
}

fn rows(table: &str, action: RowAction, rows: Vec<Vec<ColumnValue>>) -> RowsNotification {
    RowsNotification {
        position: Position::new("mysql-bin.000001", 500),
        schema: "shop".to_string(),
        table: table.to_string(),
        action,
        columns: vec!["id".to_string(), "price".to_string()],
        rows,
    }
}

/// Everything queued so far
fn drain(rx: &mut mpsc::Receiver<SyncMessage>) -> Vec<SyncMessage> {
    let mut messages = Vec::new();
    while let Ok(message) = rx.try_recv() {
        messages.push(message);
    }
    messages
}

fn events(messages: &[SyncMessage]) -> Vec<ChangeEvent> {
    messages
        .iter()
        .filter_map(|message| match message {
            SyncMessage::Change(data) => Some(ChangeEvent::decode(data).unwrap()),
            SyncMessage::Position(_) => None,
        })
        .collect()
}

#[tokio::test]
async fn test_deletes_never_produce_events() {
    let (mut intake, mut rx) = setup();
    intake
        .on_row(&rows(
            "items",
            RowAction::Delete,
            vec![vec![ColumnValue::I64(1), ColumnValue::F64(2.5)]],
        ))
        .await
        .unwrap();

    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn test_untracked_tables_never_produce_events() {
    let (mut intake, mut rx) = setup();
    for action in [RowAction::Insert, RowAction::Update, RowAction::Delete] {
        intake
            .on_row(&rows(
                "orders",
                action,
                vec![
                    vec![ColumnValue::I64(1), ColumnValue::F64(2.5)],
                    vec![ColumnValue::I64(1), ColumnValue::F64(3.5)],
                ],
            ))
            .await
            .unwrap();
    }

    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn test_every_inserted_row_becomes_an_event() {
    let (mut intake, mut rx) = setup();
    intake
        .on_row(&rows(
            "items",
            RowAction::Insert,
            vec![
                vec![ColumnValue::I64(1), ColumnValue::F64(3.5)],
                vec![ColumnValue::I64(2), ColumnValue::Null],
            ],
        ))
        .await
        .unwrap();

    let events = events(&drain(&mut rx));
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].action, Action::Insert);
    assert_eq!(events[0].body["id"], "1");
    assert_eq!(events[0].body["price"], "3.5");
    assert_eq!(events[1].body["id"], "2");
    assert_eq!(events[1].body["price"], "");
}

#[tokio::test]
async fn test_updates_use_after_images() {
    let (mut intake, mut rx) = setup();
    intake
        .on_row(&rows(
            "items",
            RowAction::Update,
            vec![
                vec![ColumnValue::I64(1), ColumnValue::F64(1.0)],
                vec![ColumnValue::I64(1), ColumnValue::F64(1.5)],
                vec![ColumnValue::I64(2), ColumnValue::F64(2.0)],
                vec![ColumnValue::I64(2), ColumnValue::F64(2.5)],
            ],
        ))
        .await
        .unwrap();

    let events = events(&drain(&mut rx));
    let prices: Vec<&str> = events.iter().map(|e| e.body["price"].as_str()).collect();
    assert_eq!(prices, vec!["1.5", "2.5"]);
    assert!(events.iter().all(|e| e.action == Action::Update));
}

#[tokio::test]
async fn test_markers_carry_checkpoint_urgency() {
    let (mut intake, mut rx) = setup();
    intake
        .on_xid(&Position::new("mysql-bin.000001", 600))
        .await
        .unwrap();
    intake
        .on_ddl(&Position::new("mysql-bin.000001", 700), "ALTER TABLE items ADD c INT")
        .await
        .unwrap();
    intake
        .on_rotate(&Position::new("mysql-bin.000002", 4))
        .await
        .unwrap();

    let markers: Vec<PositionMarker> = drain(&mut rx)
        .into_iter()
        .filter_map(|message| match message {
            SyncMessage::Position(marker) => Some(marker),
            SyncMessage::Change(_) => None,
        })
        .collect();

    assert_eq!(
        markers,
        vec![
            PositionMarker {
                position: Position::new("mysql-bin.000001", 600),
                force_checkpoint: false,
            },
            PositionMarker {
                position: Position::new("mysql-bin.000001", 700),
                force_checkpoint: true,
            },
            PositionMarker {
                position: Position::new("mysql-bin.000002", 4),
                force_checkpoint: true,
            },
        ]
    );
}

#[tokio::test]
async fn test_replay_feed_drives_intake_in_order() {
    let feed = r#"
{"kind":"rows","position":{"name":"mysql-bin.000001","pos":200},"schema":"shop","table":"items","action":"insert","columns":["id","name"],"rows":[[7,"a"]]}
{"kind":"rows","position":{"name":"mysql-bin.000001","pos":220},"schema":"shop","table":"items","action":"delete","columns":["id","name"],"rows":[[7,"a"]]}
{"kind":"rows","position":{"name":"mysql-bin.000001","pos":230},"schema":"shop","table":"orders","action":"insert","columns":["id"],"rows":[[9]]}
{"kind":"xid","position":{"name":"mysql-bin.000001","pos":250}}
"#;
    let (mut intake, mut rx) = setup();
    ReplayFeed::new(BufReader::new(feed.as_bytes()), None)
        .run(&mut intake, std::future::pending::<()>())
        .await
        .unwrap();

    let messages = drain(&mut rx);
    assert_eq!(messages.len(), 2);

    let events = events(&messages);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].routing_key(), "shop_items_insert");
    assert_eq!(events[0].body["id"], "7");
    assert_eq!(events[0].body["name"], "a");

    assert!(matches!(
        &messages[1],
        SyncMessage::Position(PositionMarker { force_checkpoint: false, .. })
    ));
}
