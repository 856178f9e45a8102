use std::sync::{Arc, Mutex};

use anyhow::Result;
use tracing::info;

use crate::{
    buffer::manager::BufferManager,
    file::manager::FileManager,
    log::manager::LogManager,
    tx::{concurrency::lock_table::LockTable, transaction::Transaction},
};

pub const DEFAULT_BLOCK_SIZE: usize = 400;
pub const DEFAULT_BUFFER_COUNT: usize = 8;
const LOG_FILE_NAME: &str = "simpledb.log";

/// Wires the four storage-core managers together behind one handle and
/// hands out transactions against them.
///
/// A `SimpleDb` owns the file manager, log manager, buffer manager, and
/// lock table for one database directory. Opening an existing directory
/// runs crash recovery before any caller-visible transaction begins.
#[derive(Debug, Clone)]
pub struct SimpleDb {
    file_manager: Arc<Mutex<FileManager>>,
    log_manager: Arc<Mutex<LogManager>>,
    buffer_manager: Arc<Mutex<BufferManager>>,
    lock_table: Arc<Mutex<LockTable>>,
}

impl SimpleDb {
    /// Opens (creating if absent) the database directory `dirname`. If the
    /// directory already existed, runs startup recovery before returning.
    pub fn new(dirname: &str, block_size: usize, num_buffers: usize) -> Result<Self> {
        let file_manager = Arc::new(Mutex::new(FileManager::new(dirname, block_size)?));
        let was_new = file_manager.lock().unwrap().is_new();

        let log_manager = Arc::new(Mutex::new(LogManager::new(
            Arc::clone(&file_manager),
            LOG_FILE_NAME,
        )?));
        let buffer_manager = Arc::new(Mutex::new(BufferManager::new(
            Arc::clone(&file_manager),
            Arc::clone(&log_manager),
            num_buffers,
        )));
        let lock_table = Arc::new(Mutex::new(LockTable::new()));

        info!(
            dir = dirname,
            block_size,
            num_buffers,
            recovered = !was_new,
            "database opened"
        );

        let db = Self {
            file_manager,
            log_manager,
            buffer_manager,
            lock_table,
        };

        if !was_new {
            let mut tx = db.new_tx()?;
            tx.recover()?;
        }

        Ok(db)
    }

    /// Starts a new transaction against this database's shared managers.
    pub fn new_tx(&self) -> Result<Transaction> {
        Transaction::new(
            Arc::clone(&self.file_manager),
            Arc::clone(&self.log_manager),
            Arc::clone(&self.buffer_manager),
            Arc::clone(&self.lock_table),
        )
    }

    pub fn block_size(&self) -> usize {
        self.file_manager.lock().unwrap().block_size()
    }

    pub fn blocks_read(&self) -> usize {
        self.file_manager.lock().unwrap().get_total_blocks_read()
    }

    pub fn blocks_written(&self) -> usize {
        self.file_manager.lock().unwrap().get_total_blocks_write()
    }

    pub fn available_buffers(&self) -> usize {
        self.buffer_manager.lock().unwrap().available()
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::SimpleDb;
    use crate::file::block_id::BlockId;

    #[test]
    fn open_creates_directory_and_serves_transactions() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("newdb");
        let db = SimpleDb::new(path.to_str().unwrap(), 400, 8).unwrap();

        let block = BlockId::new("t.tbl", 0);
        let mut tx = db.new_tx().unwrap();
        tx.pin(&block).unwrap();
        tx.set_int(&block, 0, 42, false).unwrap();
        tx.commit().unwrap();

        let mut tx2 = db.new_tx().unwrap();
        tx2.pin(&block).unwrap();
        assert_eq!(tx2.get_int(&block, 0).unwrap(), 42);
        tx2.commit().unwrap();
    }

    #[test]
    fn reopening_existing_directory_recovers_uncommitted_writes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("existingdb");
        let block = BlockId::new("t.tbl", 0);

        {
            let db = SimpleDb::new(path.to_str().unwrap(), 400, 8).unwrap();
            let mut tx = db.new_tx().unwrap();
            tx.pin(&block).unwrap();
            tx.set_int(&block, 0, 1, false).unwrap();
            tx.commit().unwrap();

            // Simulate a crash: a second transaction writes but never commits.
            let mut crashed = db.new_tx().unwrap();
            crashed.pin(&block).unwrap();
            crashed.set_int(&block, 0, 999, true).unwrap();
            // dropped without commit/rollback
        }

        let db = SimpleDb::new(path.to_str().unwrap(), 400, 8).unwrap();
        let mut tx = db.new_tx().unwrap();
        tx.pin(&block).unwrap();
        assert_eq!(tx.get_int(&block, 0).unwrap(), 1);
        tx.commit().unwrap();
    }

    #[test]
    fn reopening_existing_directory_preserves_logged_committed_writes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("committeddb");
        let block = BlockId::new("t.tbl", 0);

        {
            let db = SimpleDb::new(path.to_str().unwrap(), 400, 8).unwrap();
            let mut tx = db.new_tx().unwrap();
            tx.pin(&block).unwrap();
            // ok_to_log=true: a SET_INT32 record for this committed value reaches
            // the log, so recovery's finished-tx tracking is actually exercised.
            tx.set_int(&block, 0, 1, true).unwrap();
            tx.commit().unwrap();

            // Simulate a crash: a second transaction writes but never commits.
            let mut crashed = db.new_tx().unwrap();
            crashed.pin(&block).unwrap();
            crashed.set_int(&block, 0, 999, true).unwrap();
            // dropped without commit/rollback
        }

        let db = SimpleDb::new(path.to_str().unwrap(), 400, 8).unwrap();
        let mut tx = db.new_tx().unwrap();
        tx.pin(&block).unwrap();
        assert_eq!(tx.get_int(&block, 0).unwrap(), 1);
        tx.commit().unwrap();
    }
}
