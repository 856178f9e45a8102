use anyhow::{Ok, Result};
use std::sync::{Arc, Mutex};

use crate::{
    file::{block_id::BlockId, manager::FileManager, page::Page},
    log::manager::LogManager,
    Lsn, TxNum,
};

/// One pool frame: a page of block size, the block it currently holds (if
/// any), a pin count, and the identity of the last transaction to modify it.
///
/// `txnum >= 0` marks the frame dirty; `lsn` is the log-sequence number of
/// the record describing that modification and is the flush predicate for
/// the write-ahead rule — the log up to `lsn` must reach disk before this
/// frame's page does.
#[derive(Debug)]
pub struct Buffer {
    file_manager: Arc<Mutex<FileManager>>,
    log_manager: Arc<Mutex<LogManager>>,
    pub contents: Page,
    pub block: Option<BlockId>,
    pins: u32,
    pub txnum: TxNum,
    lsn: Lsn,
}

impl Buffer {
    pub fn new(file_manager: Arc<Mutex<FileManager>>, log_manager: Arc<Mutex<LogManager>>) -> Self {
        let block_size = file_manager.lock().unwrap().block_size();
        Self {
            file_manager,
            log_manager,
            contents: Page::new(block_size),
            block: None,
            pins: 0,
            txnum: -1,
            lsn: -1,
        }
    }

    /// Records that `txnum` last modified this buffer's page. `lsn < 0`
    /// means "no new log record" (used by undo, which must not generate a
    /// fresh log entry for its own write).
    pub fn set_modified(&mut self, txnum: TxNum, lsn: Lsn) -> Result<()> {
        self.txnum = txnum;
        if lsn >= 0 {
            self.lsn = lsn;
        }

        Ok(())
    }

    /// Write-ahead-logging in one step: force the log up to this frame's
    /// LSN, then write the page, then mark the frame clean. A no-op on an
    /// already-clean frame.
    pub fn flush(&mut self) -> Result<()> {
        if self.txnum >= 0 {
            self.log_manager.lock().unwrap().flush(self.lsn)?;
            if let Some(block) = &self.block {
                self.file_manager
                    .lock()
                    .unwrap()
                    .write(block, &mut self.contents)?;
            }
            self.txnum = -1;
        }
        Ok(())
    }

    /// Evicts whatever block this frame currently holds (flushing it first
    /// if dirty) and installs `block`, reading its current on-disk contents
    /// into the page before returning. A frame that skipped this read would
    /// hand back stale or zeroed data to whoever pins the reused frame next.
    pub fn assign_to_block(&mut self, block: &BlockId) -> Result<()> {
        self.flush()?;
        self.file_manager
            .lock()
            .unwrap()
            .read(block, &mut self.contents)?;
        self.block = Some(block.clone());
        self.pins = 0;
        Ok(())
    }

    pub fn block(&self) -> &Option<BlockId> {
        &self.block
    }

    pub fn contents(&mut self) -> &mut Page {
        &mut self.contents
    }

    pub fn is_pinned(&self) -> bool {
        self.pins > 0
    }

    pub fn pin(&mut self) {
        self.pins += 1;
    }

    pub fn unpin(&mut self) {
        self.pins -= 1;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use tempfile::tempdir;

    use crate::{
        buffer::manager::BufferManager,
        file::{block_id::BlockId, manager::FileManager},
        log::manager::LogManager,
    };

    #[test]
    fn test_buffer() {
        let temp_dir = tempdir().unwrap();
        let db_dir = temp_dir.path().to_str().unwrap();
        let test_log_file = temp_dir
            .path()
            .join("simpledb.log")
            .to_str()
            .unwrap()
            .to_string();

        let block_size = 400;
        let num_buffers = 3; // only 3 buffers

        let file_manager = Arc::new(Mutex::new(
            FileManager::new(db_dir, block_size).unwrap(),
        ));
        let log_manager = Arc::new(Mutex::new(
            LogManager::new(Arc::clone(&file_manager), &test_log_file).unwrap(),
        ));
        let buffer_manager = BufferManager::new(
            Arc::clone(&file_manager),
            Arc::clone(&log_manager),
            num_buffers,
        );

        // Test pinning and modifying first buffer
        let idx1 = buffer_manager.pin(&BlockId::new("testfile", 1)).unwrap();

        {
            let (lock, _) = &*buffer_manager.state;
            let mut state = lock.lock().unwrap();

            let n = state.buffer_pool[idx1].contents.get_int(80).unwrap();
            state.buffer_pool[idx1].contents.set_int(80, n + 1).unwrap();
            state.buffer_pool[idx1].set_modified(1, 0).unwrap(); // placeholder values
            assert_eq!(1, n + 1);
        }

        buffer_manager.unpin(idx1).unwrap();

        // One of these pins will flush buff1 to disk:
        let mut idx2 = buffer_manager.pin(&BlockId::new("testfile", 2)).unwrap();
        let idx3 = buffer_manager.pin(&BlockId::new("testfile", 3)).unwrap();
        let idx4 = buffer_manager.pin(&BlockId::new("testfile", 4)).unwrap();

        buffer_manager.unpin(idx2).unwrap();

        // Try to pin block 1 again
        idx2 = buffer_manager.pin(&BlockId::new("testfile", 1)).unwrap();

        {
            let (lock, _) = &*buffer_manager.state;
            let mut state = lock.lock().unwrap();

            state.buffer_pool[idx2].contents.set_int(80, 9999).unwrap();
            state.buffer_pool[idx2].set_modified(1, 0).unwrap(); // This modification won't get written to disk
        }

        // Cleanup
        buffer_manager.unpin(idx3).unwrap();
        buffer_manager.unpin(idx4).unwrap();
        buffer_manager.unpin(idx2).unwrap();
    }

    #[test]
    fn unpinned_frame_reused_preserves_on_disk_contents() {
        let temp_dir = tempdir().unwrap();
        let db_dir = temp_dir.path().to_str().unwrap();
        let log_file = temp_dir.path().join("t.log").to_str().unwrap().to_string();
        let block_size = 64;

        let file_manager = Arc::new(Mutex::new(FileManager::new(db_dir, block_size).unwrap()));
        let log_manager = Arc::new(Mutex::new(
            LogManager::new(Arc::clone(&file_manager), &log_file).unwrap(),
        ));
        let buffer_manager = BufferManager::new(Arc::clone(&file_manager), Arc::clone(&log_manager), 1);

        let block = BlockId::new("data.tbl", 0);
        let idx = buffer_manager.pin(&block).unwrap();
        {
            let (lock, _) = &*buffer_manager.state;
            let mut state = lock.lock().unwrap();
            state.buffer_pool[idx].contents.set_int(0, 123).unwrap();
            state.buffer_pool[idx].set_modified(1, 0).unwrap();
        }
        buffer_manager.unpin(idx).unwrap();

        // Pinning a different block reuses and flushes the only frame.
        let other = BlockId::new("data.tbl", 1);
        let idx2 = buffer_manager.pin(&other).unwrap();
        buffer_manager.unpin(idx2).unwrap();

        // Re-pinning the original block must read the flushed value back,
        // not an empty/zeroed page.
        let idx3 = buffer_manager.pin(&block).unwrap();
        let (lock, _) = &*buffer_manager.state;
        let mut state = lock.lock().unwrap();
        assert_eq!(state.buffer_pool[idx3].contents.get_int(0).unwrap(), 123);
    }
}
