//! 시나리오 실행기 -- spawn, 본문, teardown, 로그 정책
//!
//! 본문이 실패해도 teardown은 항상 실행됩니다. 실패 판정 순서:
//! 1. 본문 에러
//! 2. 비정상 종료
//! 3. stderr의 critical 라인
//!
//! warning 라인은 실패가 아니며 `warn!`으로만 기록됩니다.

use tracing::{info, warn};

use crate::error::{ScenarioError, SessionError};
use crate::session::{Session, SessionBuilder, TeardownReport};

/// 시나리오 성공 결과
#[derive(Debug)]
pub struct ScenarioOutput<T> {
    /// 본문 반환값
    pub value: T,
    /// 종료 보고서
    pub report: TeardownReport,
}

/// 세션 하나를 감싸는 시나리오
pub struct Scenario {
    builder: SessionBuilder,
}

impl Scenario {
    pub fn new(builder: SessionBuilder) -> Self {
        Self { builder }
    }

    /// 세션을 띄우고 `body`를 실행한 뒤 정리합니다.
    pub fn run<T, F>(self, body: F) -> Result<ScenarioOutput<T>, ScenarioError>
    where
        F: FnOnce(&mut Session) -> Result<T, SessionError>,
    {
        let mut session = self.builder.build()?.spawn()?;
        let result = body(&mut session);
        let report = session.teardown();

        let value = match result {
            Ok(value) => value,
            Err(source) => {
                return Err(ScenarioError::Body {
                    source,
                    report: Box::new(report),
                });
            }
        };

        if !report.is_clean() {
            return Err(ScenarioError::AbnormalExit {
                report: Box::new(report),
            });
        }

        let criticals: Vec<String> = report
            .critical_lines()
            .into_iter()
            .map(str::to_owned)
            .collect();
        if !criticals.is_empty() {
            return Err(ScenarioError::CriticalLines {
                lines: criticals,
                report: Box::new(report),
            });
        }

        for line in report.warning_lines() {
            warn!(line, "warning in session log");
        }

        info!(exit = %report.exit_label(), "scenario passed");
        Ok(ScenarioOutput { value, report })
    }
}
