//! 搜索服务模块
//!
//! - PathSearchService: 按路径并行扫描（项目范围查找）
//! - PathReplaceService: 按路径替换（项目范围替换）

mod global;
mod replace;

use crate::kernel::services::ports::PathError;
use std::io::Read;
use std::path::Path;

pub use global::PathSearchService;
pub use replace::PathReplaceService;

const BINARY_PROBE_LEN: usize = 8192;

fn is_likely_binary(content: &[u8]) -> bool {
    content.iter().take(BINARY_PROBE_LEN).any(|&b| b == 0)
}

fn read_text_file(path: &Path, max_file_size: u64) -> Result<Vec<u8>, PathError> {
    let mut file = std::fs::File::open(path).map_err(|e| PathError::from_io(path, &e))?;
    let metadata = file.metadata().map_err(|e| PathError::from_io(path, &e))?;
    if metadata.len() > max_file_size {
        return Err(PathError::new(
            path,
            format!(
                "File is too large to search ({} bytes, limit {})",
                metadata.len(),
                max_file_size
            ),
        ));
    }

    let mut bytes = Vec::with_capacity(metadata.len() as usize);
    file.read_to_end(&mut bytes)
        .map_err(|e| PathError::from_io(path, &e))?;
    Ok(bytes)
}
