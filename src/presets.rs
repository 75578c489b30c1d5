//! The station database migrations, with their target layouts written out.

use crate::column_drop::DropRequest;
use crate::row_move::{MoveRequest, RowFilter};
use crate::schema::IndexSpec;

pub const EWCS_DATA: &str = "ewcs_data";
pub const EWCS_IMAGES: &str = "ewcs_images";
pub const OASC_IMAGES: &str = "oasc_images";

const TIMESTAMP_INDEX: &str = "idx_ewcs_data_timestamp";

/// `ewcs_data` after `cs125_current` is gone.
const EWCS_DATA_WITHOUT_CS125_CURRENT: [&str; 24] = [
    "id",
    "timestamp",
    "station_name",
    "power_save_mode",
    "cs125_visibility",
    "cs125_synop",
    "cs125_temp",
    "cs125_humidity",
    "sht45_temp",
    "sht45_humidity",
    "rpi_temp",
    "chan1_current",
    "chan2_current",
    "chan3_current",
    "chan4_current",
    "pv_vol",
    "pv_cur",
    "load_vol",
    "load_cur",
    "bat_temp",
    "dev_temp",
    "charg_equip_stat",
    "dischg_equip_stat",
    "created_at",
];

/// `ewcs_data` after both `cs125_current` and `power_save_mode` are gone.
const EWCS_DATA_WITHOUT_POWER_SAVE_MODE: [&str; 23] = [
    "id",
    "timestamp",
    "station_name",
    "cs125_visibility",
    "cs125_synop",
    "cs125_temp",
    "cs125_humidity",
    "sht45_temp",
    "sht45_humidity",
    "rpi_temp",
    "chan1_current",
    "chan2_current",
    "chan3_current",
    "chan4_current",
    "pv_vol",
    "pv_cur",
    "load_vol",
    "load_cur",
    "bat_temp",
    "dev_temp",
    "charg_equip_stat",
    "dischg_equip_stat",
    "created_at",
];

fn timestamp_index() -> IndexSpec {
    IndexSpec::new(TIMESTAMP_INDEX, &["timestamp"])
}

pub fn drop_cs125_current() -> DropRequest {
    DropRequest::new(EWCS_DATA, &["cs125_current"])
        .with_expected_columns(&EWCS_DATA_WITHOUT_CS125_CURRENT)
        .with_index(timestamp_index())
}

pub fn drop_power_save_mode() -> DropRequest {
    DropRequest::new(EWCS_DATA, &["power_save_mode"])
        .with_expected_columns(&EWCS_DATA_WITHOUT_POWER_SAVE_MODE)
        .with_index(timestamp_index())
}

/// OASC sky-camera frames are FITS files that were written to the Spinel camera table.
pub fn move_oasc_images() -> MoveRequest {
    MoveRequest::new(
        EWCS_IMAGES,
        OASC_IMAGES,
        &["timestamp", "filename", "created_at"],
        RowFilter::suffix("filename", ".fits"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column_drop::{drop_columns, DropOutcome};
    use crate::database::testing::temp_db;
    use crate::error::MigrateError;
    use crate::row_move::move_rows;
    use pretty_assertions::assert_eq;

    const STATION_DB: &str = r#"
        CREATE TABLE ewcs_data (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp INTEGER NOT NULL,
            station_name TEXT,
            power_save_mode TEXT DEFAULT 'normal',
            cs125_current REAL,
            cs125_visibility REAL,
            cs125_synop INTEGER,
            cs125_temp REAL,
            cs125_humidity REAL,
            sht45_temp REAL,
            sht45_humidity REAL,
            rpi_temp REAL,
            chan1_current REAL,
            chan2_current REAL,
            chan3_current REAL,
            chan4_current REAL,
            pv_vol REAL,
            pv_cur REAL,
            load_vol REAL,
            load_cur REAL,
            bat_temp REAL,
            dev_temp REAL,
            charg_equip_stat INTEGER,
            dischg_equip_stat INTEGER,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
        CREATE INDEX idx_ewcs_data_timestamp ON ewcs_data(timestamp);
        INSERT INTO ewcs_data (timestamp, station_name, power_save_mode, cs125_current, cs125_visibility, pv_vol)
        VALUES
            (1700000000, 'ewcs-1', 'normal', 0.12, 20000.0, 13.1),
            (1700000060, 'ewcs-1', 'saving', 0.11, 18000.0, 13.0),
            (1700000120, 'ewcs-1', 'normal', NULL, NULL, 12.9);
    "#;

    #[test]
    fn test_station_migrations_in_order() {
        let (_dir, mut db) = temp_db(STATION_DB);

        let first = drop_columns(&mut db, &drop_cs125_current()).unwrap();
        assert_eq!(first.rows_migrated(), 3);
        assert_eq!(
            db.column_names(EWCS_DATA).unwrap(),
            EWCS_DATA_WITHOUT_CS125_CURRENT.to_vec()
        );

        let second = drop_columns(&mut db, &drop_power_save_mode()).unwrap();
        assert_eq!(second.rows_migrated(), 3);
        assert_eq!(
            db.column_names(EWCS_DATA).unwrap(),
            EWCS_DATA_WITHOUT_POWER_SAVE_MODE.to_vec()
        );
        assert!(db.index_exists(TIMESTAMP_INDEX).unwrap());

        let visibility: Option<f64> = db
            .conn()
            .query_row(
                "SELECT cs125_visibility FROM ewcs_data WHERE timestamp = 1700000060",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(visibility, Some(18000.0));

        // Both presets are no-ops the second time around
        assert!(matches!(
            drop_columns(&mut db, &drop_cs125_current()).unwrap(),
            DropOutcome::NothingToMigrate { .. }
        ));
        assert!(matches!(
            drop_columns(&mut db, &drop_power_save_mode()).unwrap(),
            DropOutcome::NothingToMigrate { .. }
        ));
    }

    #[test]
    fn test_power_save_mode_before_cs125_current_is_rejected() {
        let (_dir, mut db) = temp_db(STATION_DB);

        let err = drop_columns(&mut db, &drop_power_save_mode()).unwrap_err();

        assert!(
            matches!(&err, MigrateError::Validation(msg) if msg.contains("unexpected columns [cs125_current]")),
            "unexpected error: {}",
            err
        );
        assert_eq!(db.column_names(EWCS_DATA).unwrap().len(), 25);
    }

    #[test]
    fn test_appended_power_save_mode_keeps_live_order() {
        // Older stations gained power_save_mode through ALTER TABLE, so it sits last
        let setup = STATION_DB
            .replace("power_save_mode TEXT DEFAULT 'normal',\n", "")
            .replace(
                "CREATE INDEX idx_ewcs_data_timestamp",
                "ALTER TABLE ewcs_data ADD COLUMN power_save_mode TEXT DEFAULT 'normal';\n        CREATE INDEX idx_ewcs_data_timestamp",
            );
        let (_dir, mut db) = temp_db(&setup);
        assert_eq!(db.column_names(EWCS_DATA).unwrap().last().unwrap(), "power_save_mode");

        drop_columns(&mut db, &drop_cs125_current()).unwrap();
        let after_first = db.column_names(EWCS_DATA).unwrap();
        assert_eq!(after_first.last().unwrap(), "power_save_mode");
        assert_eq!(after_first.len(), EWCS_DATA_WITHOUT_CS125_CURRENT.len());

        drop_columns(&mut db, &drop_power_save_mode()).unwrap();
        assert_eq!(
            db.column_names(EWCS_DATA).unwrap(),
            EWCS_DATA_WITHOUT_POWER_SAVE_MODE.to_vec()
        );
        assert_eq!(db.count_rows(EWCS_DATA).unwrap(), 3);
    }

    #[test]
    fn test_move_oasc_images() {
        let (_dir, mut db) = temp_db(
            r#"
            CREATE TABLE ewcs_images (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp INTEGER NOT NULL,
                filename TEXT NOT NULL,
                thumbnail TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );
            CREATE TABLE oasc_images (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp INTEGER NOT NULL,
                filename TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );
            INSERT INTO ewcs_images (timestamp, filename, created_at) VALUES
                (10, 'spinel_10.jpg', '2024-01-01 00:00:10'),
                (20, 'oasc_20.fits', '2024-01-01 00:00:20');
            "#,
        );

        let outcome = move_rows(&mut db, &move_oasc_images()).unwrap();

        assert_eq!(outcome.rows_moved(), 1);
        let (ts, created): (i64, String) = db
            .conn()
            .query_row(
                "SELECT timestamp, created_at FROM oasc_images WHERE filename = 'oasc_20.fits'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(ts, 20);
        assert_eq!(created, "2024-01-01 00:00:20");
        assert_eq!(db.count_rows(EWCS_IMAGES).unwrap(), 1);
    }
}
