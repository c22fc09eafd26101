//! SSE 行缓冲

/// SSE 数据帧
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    /// `data: ...` 负载
    Data(String),
    /// `data: [DONE]`
    Done,
}

/// 累积字节块，按行切出完整的 `data:` 帧
///
/// 只解码完整的行，跨块的多字节字符不会被截断
#[derive(Debug, Default)]
pub struct SseBuffer {
    pending: Vec<u8>,
}

impl SseBuffer {
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseFrame> {
        self.pending.extend_from_slice(bytes);

        let mut frames = Vec::new();
        while let Some(newline) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim();

            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.trim_start();
            if data == "[DONE]" {
                frames.push(SseFrame::Done);
            } else if !data.is_empty() {
                frames.push(SseFrame::Data(data.to_string()));
            }
        }
        frames
    }
}
