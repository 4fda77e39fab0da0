//! 출력 캡처 -- 자식 프로세스 stdout/stderr 누적 버퍼
//!
//! [`OutputCapture`]는 non-blocking 파이프에서 읽은 바이트를 텍스트로
//! 디코딩해 스트림별 버퍼에 누적합니다. 버퍼는 세션 동안 절대 줄어들지 않으므로
//! [`OutputCapture::contains`]는 한 번 참이 되면 계속 참입니다.
//!
//! # 디코딩 정책
//! - UTF-8 멀티바이트 문자가 두 번의 read에 걸쳐 잘리면 다음 read까지 보류
//! - 잘못된 바이트 시퀀스는 U+FFFD로 치환
//! - 스트림이 닫히면 보류 중인 바이트를 치환 문자로 flush

use std::io::{self, Read};

use phosh_itest_core::types::{Severity, Stream};

/// 한 번의 read 호출 크기
const READ_CHUNK: usize = 8 * 1024;

/// `append_available` 한 번에 읽을 최대 바이트 수
///
/// 출력이 끊이지 않는 자식 프로세스라도 호출자가 제어권을 돌려받도록 제한합니다.
const MAX_READ_PER_CALL: usize = 1024 * 1024;

/// non-blocking read 한 번의 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// 데이터를 읽음 (바이트 수)
    Data(usize),
    /// 지금은 읽을 데이터가 없음
    Empty,
    /// 쓰기 쪽이 닫힘 (EOF)
    Closed,
}

/// 스트림 하나의 누적 버퍼
#[derive(Debug, Default)]
struct StreamBuffer {
    /// 디코딩된 텍스트
    text: String,
    /// 아직 완성되지 않은 UTF-8 시퀀스
    pending: Vec<u8>,
    /// EOF 관찰 여부
    closed: bool,
}

impl StreamBuffer {
    fn push_bytes(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);

        let mut consumed = 0;
        while consumed < self.pending.len() {
            match std::str::from_utf8(&self.pending[consumed..]) {
                Ok(valid) => {
                    self.text.push_str(valid);
                    consumed = self.pending.len();
                }
                Err(e) => {
                    let valid_end = consumed + e.valid_up_to();
                    self.text
                        .push_str(&String::from_utf8_lossy(&self.pending[consumed..valid_end]));
                    consumed = valid_end;
                    match e.error_len() {
                        Some(len) => {
                            self.text.push(char::REPLACEMENT_CHARACTER);
                            consumed += len;
                        }
                        // 시퀀스가 잘림 -- 다음 read를 기다림
                        None => break,
                    }
                }
            }
        }
        self.pending.drain(..consumed);
    }

    fn flush_pending(&mut self) {
        if !self.pending.is_empty() {
            self.text.push_str(&String::from_utf8_lossy(&self.pending));
            self.pending.clear();
        }
    }
}

/// stdout/stderr 누적 캡처 버퍼
#[derive(Debug, Default)]
pub struct OutputCapture {
    stdout: StreamBuffer,
    stderr: StreamBuffer,
}

impl OutputCapture {
    /// 빈 캡처 버퍼를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    fn buffer(&self, stream: Stream) -> &StreamBuffer {
        match stream {
            Stream::Stdout => &self.stdout,
            Stream::Stderr => &self.stderr,
        }
    }

    fn buffer_mut(&mut self, stream: Stream) -> &mut StreamBuffer {
        match stream {
            Stream::Stdout => &mut self.stdout,
            Stream::Stderr => &mut self.stderr,
        }
    }

    /// non-blocking reader에서 지금 읽을 수 있는 만큼 읽어 버퍼에 추가합니다.
    ///
    /// 데이터가 없으면(`WouldBlock`) 즉시 [`ReadStatus::Empty`]를 반환하며
    /// 절대 블록하지 않습니다. `reader`가 blocking 모드라면 이 보장은 깨지므로
    /// 호출자가 파이프를 먼저 non-blocking으로 전환해야 합니다.
    ///
    /// # Errors
    ///
    /// `WouldBlock`/`Interrupted` 이외의 I/O 에러를 그대로 반환합니다.
    pub fn append_available<R: Read>(
        &mut self,
        stream: Stream,
        reader: &mut R,
    ) -> io::Result<ReadStatus> {
        let mut chunk = [0u8; READ_CHUNK];
        let mut total = 0;

        while total < MAX_READ_PER_CALL {
            match reader.read(&mut chunk) {
                Ok(0) => {
                    let buffer = self.buffer_mut(stream);
                    buffer.flush_pending();
                    buffer.closed = true;
                    if total == 0 {
                        return Ok(ReadStatus::Closed);
                    }
                    break;
                }
                Ok(n) => {
                    self.buffer_mut(stream).push_bytes(&chunk[..n]);
                    total += n;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e),
            }
        }

        if total == 0 {
            Ok(ReadStatus::Empty)
        } else {
            tracing::trace!(%stream, bytes = total, "captured output");
            Ok(ReadStatus::Data(total))
        }
    }

    /// 이미 읽은 바이트를 버퍼에 직접 추가합니다.
    pub fn append_bytes(&mut self, stream: Stream, bytes: &[u8]) {
        self.buffer_mut(stream).push_bytes(bytes);
    }

    /// 지금까지 누적된 버퍼에 `needle`이 포함되어 있는지 확인합니다.
    pub fn contains(&self, stream: Stream, needle: &str) -> bool {
        self.text(stream).contains(needle)
    }

    /// 버퍼를 줄 단위로 나눠 `marker`를 포함하는 줄을 모두 반환합니다.
    pub fn extract_by_marker(&self, stream: Stream, marker: &str) -> Vec<&str> {
        lines_with_marker(self.text(stream), marker)
    }

    /// stderr에서 해당 심각도로 태깅된 줄을 반환합니다.
    pub fn severity_lines(&self, severity: Severity) -> Vec<&str> {
        self.extract_by_marker(Stream::Stderr, severity.marker())
    }

    /// 스트림의 누적 텍스트
    pub fn text(&self, stream: Stream) -> &str {
        &self.buffer(stream).text
    }

    /// 누적된 stdout
    pub fn stdout(&self) -> &str {
        self.text(Stream::Stdout)
    }

    /// 누적된 stderr
    pub fn stderr(&self) -> &str {
        self.text(Stream::Stderr)
    }

    /// 스트림의 EOF 관찰 여부
    pub fn is_closed(&self, stream: Stream) -> bool {
        self.buffer(stream).closed
    }

    /// 버퍼를 소비해 (stdout, stderr) 텍스트를 반환합니다.
    ///
    /// 보류 중인 불완전 UTF-8 바이트는 치환 문자로 flush됩니다.
    pub fn into_text(mut self) -> (String, String) {
        self.stdout.flush_pending();
        self.stderr.flush_pending();
        (self.stdout.text, self.stderr.text)
    }
}

/// `text`를 줄 단위로 나눠 `marker`를 포함하는 줄을 반환합니다.
pub fn lines_with_marker<'a>(text: &'a str, marker: &str) -> Vec<&'a str> {
    text.lines().filter(|line| line.contains(marker)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 스크립트된 청크를 순서대로 돌려주고, 소진되면 WouldBlock을 반환하는 reader
    struct ScriptedReader {
        chunks: Vec<io::Result<Vec<u8>>>,
    }

    impl ScriptedReader {
        fn new(chunks: Vec<io::Result<Vec<u8>>>) -> Self {
            let mut chunks = chunks;
            chunks.reverse();
            Self { chunks }
        }
    }

    impl Read for ScriptedReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.chunks.pop() {
                Some(Ok(bytes)) => {
                    buf[..bytes.len()].copy_from_slice(&bytes);
                    Ok(bytes.len())
                }
                Some(Err(e)) => Err(e),
                None => Err(io::ErrorKind::WouldBlock.into()),
            }
        }
    }

    #[test]
    fn empty_reader_is_a_noop() {
        let mut capture = OutputCapture::new();
        let mut reader = ScriptedReader::new(vec![]);
        let status = capture
            .append_available(Stream::Stdout, &mut reader)
            .unwrap();
        assert_eq!(status, ReadStatus::Empty);
        assert!(capture.stdout().is_empty());
    }

    #[test]
    fn appends_all_available_chunks() {
        let mut capture = OutputCapture::new();
        let mut reader = ScriptedReader::new(vec![
            Ok(b"hello ".to_vec()),
            Ok(b"world\n".to_vec()),
        ]);
        let status = capture
            .append_available(Stream::Stdout, &mut reader)
            .unwrap();
        assert_eq!(status, ReadStatus::Data(12));
        assert_eq!(capture.stdout(), "hello world\n");
        assert!(capture.stderr().is_empty());
    }

    #[test]
    fn interrupted_read_is_retried() {
        let mut capture = OutputCapture::new();
        let mut reader = ScriptedReader::new(vec![
            Err(io::ErrorKind::Interrupted.into()),
            Ok(b"after signal".to_vec()),
        ]);
        capture
            .append_available(Stream::Stderr, &mut reader)
            .unwrap();
        assert_eq!(capture.stderr(), "after signal");
    }

    #[test]
    fn other_errors_propagate() {
        let mut capture = OutputCapture::new();
        let mut reader = ScriptedReader::new(vec![Err(io::Error::other("broken"))]);
        let err = capture
            .append_available(Stream::Stderr, &mut reader)
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Other);
    }

    #[test]
    fn eof_is_reported_as_closed() {
        let mut capture = OutputCapture::new();
        let mut reader = ScriptedReader::new(vec![Ok(Vec::new())]);
        let status = capture
            .append_available(Stream::Stdout, &mut reader)
            .unwrap();
        assert_eq!(status, ReadStatus::Closed);
        assert!(capture.is_closed(Stream::Stdout));
    }

    #[test]
    fn split_utf8_sequence_is_carried_over() {
        let mut capture = OutputCapture::new();
        let text = "Dies ist ein Test für Cellbroadcasts";
        let bytes = text.as_bytes();
        // 'ü' (0xC3 0xBC) 한가운데서 자름
        let split = text.find('ü').unwrap() + 1;

        capture.append_bytes(Stream::Stdout, &bytes[..split]);
        assert!(!capture.stdout().contains('\u{FFFD}'));
        capture.append_bytes(Stream::Stdout, &bytes[split..]);
        assert_eq!(capture.stdout(), text);
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let mut capture = OutputCapture::new();
        capture.append_bytes(Stream::Stderr, b"bad \xFF byte");
        assert_eq!(capture.stderr(), "bad \u{FFFD} byte");
    }

    #[test]
    fn truncated_sequence_is_flushed_on_eof() {
        let mut capture = OutputCapture::new();
        let mut reader = ScriptedReader::new(vec![Ok(b"end \xC3".to_vec()), Ok(Vec::new())]);
        capture
            .append_available(Stream::Stdout, &mut reader)
            .unwrap();
        assert_eq!(capture.stdout(), "end \u{FFFD}");
    }

    #[test]
    fn contains_is_monotonic() {
        let mut capture = OutputCapture::new();
        capture.append_bytes(Stream::Stdout, b" Modem is present\n");
        assert!(capture.contains(Stream::Stdout, "Modem is present"));
        capture.append_bytes(Stream::Stdout, b" WWAN data connection present: 1\n");
        assert!(capture.contains(Stream::Stdout, "Modem is present"));
        assert!(!capture.contains(Stream::Stderr, "Modem is present"));
    }

    #[test]
    fn extract_by_marker_returns_matching_lines() {
        let mut capture = OutputCapture::new();
        capture.append_bytes(
            Stream::Stderr,
            b"phosh-wwan-mm-CRITICAL **: 10:00:00: no modem\n\
              phosh-bt-manager-DEBUG: BT present: 1\n\
              phosh-wifi-manager-WARNING **: 10:00:01: no device\n\
              phosh-CRITICAL **: 10:00:02: oops",
        );

        let criticals = capture.severity_lines(Severity::Critical);
        assert_eq!(criticals.len(), 2);
        assert!(criticals[0].starts_with("phosh-wwan-mm-CRITICAL"));
        assert!(criticals[1].ends_with("oops"));

        let warnings = capture.severity_lines(Severity::Warning);
        assert_eq!(warnings, vec!["phosh-wifi-manager-WARNING **: 10:00:01: no device"]);
    }

    #[test]
    fn empty_buffer_has_no_severity_lines() {
        let capture = OutputCapture::new();
        assert!(capture.severity_lines(Severity::Critical).is_empty());
        assert!(capture.severity_lines(Severity::Warning).is_empty());
    }
}
