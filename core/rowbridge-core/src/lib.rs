//! # rowbridge: external encodings as mutable tables
//!
//! rowbridge는 구분자 텍스트, 고정폭 레코드, XML, key/value, 바이너리 메타데이터,
//! 네이티브 구조체 등 이질적인 외부 인코딩을 균일한 행/열 테이블로 노출하고,
//! 세 가지 영속성 전략으로 백업 파일과 동기화합니다.
//! SQL 실행은 외부 쿼리 엔진의 몫이며, 이 크레이트는 [`TableProvider`]를 통해 테이블을 제공합니다.
//!
//! ## 주요 특징
//!
//! - **Format Codec Registry**: CSV/pipe/tab/passwd, fixed-width, INI, paragraph,
//!   weblog, XML, ID3 태그, JSON 구조체, Parquet, 사용자 정의 코덱
//! - **Hierarchical Fold**: 중첩 XML을 레코드 경로와 fold 규칙으로 평탄화
//! - **Persistence**: transient / batch export / continuous (카탈로그 바인딩)
//! - **Apache Arrow 연동**: 모든 테이블을 `RecordBatch`로 조회 가능
//!
//! ## 빠른 시작
//!
//! ```rust
//! use rowbridge_core::{
//!     ExportDirective, FormatTag, ImportDirective, RowQuery, Session, SessionConfig, Source,
//!     TableProvider,
//! };
//! use rowbridge_core::schema::ColumnSpec;
//!
//! # fn main() -> rowbridge_core::BridgeResult<()> {
//! let dir = tempfile::tempdir()?;
//! let session = Session::new(SessionConfig::new().with_root_dir(dir.path()))?;
//!
//! // 인라인 CSV를 테이블로 가져오기
//! let name = session.import(
//!     ImportDirective::new(FormatTag::Csv, Source::text("id,name\n1,ann\n2,bob\n"))
//!         .with_columns(ColumnSpec::first_line()),
//! )?;
//! assert_eq!(name, "table1");
//! assert_eq!(session.table(&name)?.row_count()?, 2);
//!
//! // 파이프 구분 파일로 내보내기 (전체 덮어쓰기)
//! let query = RowQuery::all(&name).filter(|row| row.get("id") == Some("2"));
//! session.export(ExportDirective::new(query, FormatTag::Pipe, "out.txt"))?;
//! assert_eq!(std::fs::read_to_string(dir.path().join("out.txt"))?, "2|bob\n");
//! # Ok(())
//! # }
//! ```
//!
//! ## 모듈 구조
//!
//! - [`format`]: 포맷별 codec과 registry
//! - [`schema`]: 테이블/컬럼 이름 결정과 식별자 검증
//! - [`fold`]: XML 계층 평탄화 규칙
//! - [`table`]: 인메모리 테이블과 [`TableProvider`]
//! - [`persist`]: 영속성 전략, 위치 해석, 원격 fetch
//! - [`catalog`]: continuous 바인딩 카탈로그
//! - [`engine`]: 지시(directive) 실행 세션 ([`Session`])

pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod fold;
pub mod format;
pub mod persist;
pub mod schema;
pub mod table;

// Logging utilities
pub mod logging;

// Re-export commonly used types
pub use catalog::{Catalog, CatalogEntry};
pub use config::SessionConfig;
pub use engine::{ConvertDirective, ExportDirective, ImportDirective, RowQuery, Session, Source};
pub use error::{BridgeError, BridgeResult, ErrorKind};
pub use format::{Codec, CodecRegistry, FormatOptions, FormatTag, RawInput};
pub use fold::FoldSpec;
pub use persist::{Fetch, PersistenceMode};
pub use table::{Row, Table, TableProvider};
