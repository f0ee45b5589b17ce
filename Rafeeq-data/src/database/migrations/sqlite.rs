use rusqlite::Connection;
use tracing::info;

/// Run SQLite migrations
pub fn run_migrations(conn: &Connection) -> Result<(), String> {
    info!("Running SQLite migrations");

    create_escalation_events_table(conn)?;
    create_vital_readings_table(conn)?;
    create_dispatch_records_table(conn)?;
    create_patient_indexes(conn)?;

    info!("SQLite migrations completed successfully");
    Ok(())
}

/// Create the escalation events table
fn create_escalation_events_table(conn: &Connection) -> Result<(), String> {
    info!("Creating escalation_events table if not exists");

    conn.execute(
        "CREATE TABLE IF NOT EXISTS escalation_events (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            patient_id TEXT NOT NULL,
            from_state TEXT NOT NULL,
            to_state TEXT NOT NULL,
            cause TEXT NOT NULL,
            category TEXT,
            timestamp TEXT NOT NULL
        )",
        [],
    ).map_err(|e| e.to_string())?;

    Ok(())
}

/// Create the vital readings table
fn create_vital_readings_table(conn: &Connection) -> Result<(), String> {
    info!("Creating vital_readings table if not exists");

    conn.execute(
        "CREATE TABLE IF NOT EXISTS vital_readings (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            patient_id TEXT NOT NULL,
            heart_rate REAL NOT NULL,
            spo2 REAL NOT NULL,
            temperature REAL NOT NULL,
            emotional_state TEXT,
            timestamp TEXT NOT NULL
        )",
        [],
    ).map_err(|e| e.to_string())?;

    Ok(())
}

/// Create the dispatch records table
fn create_dispatch_records_table(conn: &Connection) -> Result<(), String> {
    info!("Creating dispatch_records table if not exists");

    conn.execute(
        "CREATE TABLE IF NOT EXISTS dispatch_records (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            patient_id TEXT NOT NULL,
            event_id TEXT NOT NULL,
            category TEXT NOT NULL,
            outcome TEXT NOT NULL,
            attempts INTEGER NOT NULL,
            reference TEXT,
            detail TEXT,
            message TEXT,
            timestamp TEXT NOT NULL
        )",
        [],
    ).map_err(|e| e.to_string())?;

    Ok(())
}

/// Create per-patient indexes for history lookups
fn create_patient_indexes(conn: &Connection) -> Result<(), String> {
    info!("Creating patient indexes");

    conn.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_escalation_events_patient
            ON escalation_events (patient_id, seq);
         CREATE INDEX IF NOT EXISTS idx_vital_readings_patient
            ON vital_readings (patient_id, seq);
         CREATE INDEX IF NOT EXISTS idx_dispatch_records_patient
            ON dispatch_records (patient_id, seq);",
    ).map_err(|e| format!("Failed to create index: {}", e))?;

    Ok(())
}
