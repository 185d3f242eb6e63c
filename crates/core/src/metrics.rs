//! 메트릭 상수 및 설명 등록
//!
//! 인스턴스 생명주기 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`,
//! `metrics::histogram!()` 매크로를 호출합니다.
//!
//! 레코더는 임베딩하는 쪽에서 설치합니다. 설치되지 않은 경우 모든 호출은 no-op입니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `scoutpost_`
//! - 영역: `instance_`, `runtime_`, `database_`, `reconcile_`
//! - 접미어: `_total` (counter), `_seconds` (histogram/latency), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(scoutpost_core::metrics::INSTANCE_CREATES_TOTAL,
//!     scoutpost_core::metrics::LABEL_RESULT => "created").increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 결과 레이블 키 (created, existing, failed, deleted, not_found)
pub const LABEL_RESULT: &str = "result";

/// 드리프트 종류 레이블 키 (orphaned, missing, stalled, collision)
pub const LABEL_KIND: &str = "kind";

// ─── 인스턴스 생명주기 메트릭 ─────────────────────────────────────────

/// 생성 요청 수 (counter, label: result)
pub const INSTANCE_CREATES_TOTAL: &str = "scoutpost_instance_creates_total";

/// 삭제 요청 수 (counter, label: result)
pub const INSTANCE_DELETES_TOTAL: &str = "scoutpost_instance_deletes_total";

/// 생성 소요 시간 (histogram, 초)
pub const INSTANCE_CREATE_DURATION_SECONDS: &str = "scoutpost_instance_create_duration_seconds";

/// 롤백 후에도 남았을 수 있는 고아 컨테이너 수 (counter)
pub const INSTANCE_ORPHANS_TOTAL: &str = "scoutpost_instance_orphans_total";

// ─── 런타임/데이터베이스 메트릭 ──────────────────────────────────────

/// 컨테이너 런타임 호출 실패 수 (counter)
pub const RUNTIME_ERRORS_TOTAL: &str = "scoutpost_runtime_errors_total";

/// 컨테이너 런타임 호출 타임아웃 수 (counter)
pub const RUNTIME_TIMEOUTS_TOTAL: &str = "scoutpost_runtime_timeouts_total";

/// 데이터베이스 삭제 실패 수 (counter)
pub const DATABASE_DROP_FAILURES_TOTAL: &str = "scoutpost_database_drop_failures_total";

// ─── 조정(reconcile) 메트릭 ─────────────────────────────────────────

/// 마지막 조정에서 발견된 드리프트 항목 수 (gauge, label: kind)
pub const RECONCILE_DRIFT: &str = "scoutpost_reconcile_drift";

// ─── 히스토그램 버킷 정의 ────────────────────────────────────────────

/// 생성 소요 시간 히스토그램 버킷 (초)
///
/// 이미지 pull 포함 시 수십 초까지 걸릴 수 있음
pub const CREATE_DURATION_BUCKETS: [f64; 8] = [0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출해야 합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    describe_counter!(
        INSTANCE_CREATES_TOTAL,
        "Instance create requests by outcome"
    );
    describe_counter!(
        INSTANCE_DELETES_TOTAL,
        "Instance delete requests by outcome"
    );
    describe_histogram!(
        INSTANCE_CREATE_DURATION_SECONDS,
        "Time to provision a new instance in seconds"
    );
    describe_counter!(
        INSTANCE_ORPHANS_TOTAL,
        "Failed rollbacks that may have left a container behind"
    );
    describe_counter!(
        RUNTIME_ERRORS_TOTAL,
        "Container runtime calls that returned an error"
    );
    describe_counter!(
        RUNTIME_TIMEOUTS_TOTAL,
        "Container runtime calls that exceeded their deadline"
    );
    describe_counter!(
        DATABASE_DROP_FAILURES_TOTAL,
        "Logical database drops that failed during delete"
    );
    describe_gauge!(
        RECONCILE_DRIFT,
        "Drift entries found by the last reconciliation sweep"
    );
}
