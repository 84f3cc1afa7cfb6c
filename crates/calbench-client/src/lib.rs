//! # Calbench Client
//!
//! 校准验收测试的高层接口：
//! - 测试配置与限值表（[`TestProfile`]）
//! - 阶段测试序列状态机（[`StageSequencer`]）
//! - 阶段结果与判定（[`TestResult`]、[`Verdict`]）
//! - 结构化报告（[`RunReport`]）
//! - 操作员交互（[`OperatorPrompt`]）与序列观察者（[`hooks`]）
//!
//! # 示例
//!
//! ```no_run
//! use calbench_client::{AutoConfirm, StageSequencer, TestKind, TestProfile};
//! use calbench_driver::InstrumentBuilder;
//!
//! let dmm = InstrumentBuilder::new()
//!     .address("prologix://192.168.1.50/16".parse().unwrap())
//!     .build()
//!     .unwrap();
//!
//! let profile = TestProfile::builtin(TestKind::ZeroCarryover).unwrap();
//! let mut sequencer = StageSequencer::new(dmm);
//! let results = sequencer.run(&profile, &mut AutoConfirm::new()).unwrap();
//! assert_eq!(results.len(), 10);
//! ```

pub mod error;
pub mod hooks;
pub mod operator;
pub mod profile;
pub mod report;
pub mod result;
pub mod sequencer;

// 重新导出常用类型
pub use error::{OperatorError, SequencerError, StageFailure};
pub use hooks::{HookManager, SequencerObserver};
pub use operator::{AutoConfirm, OperatorPrompt};
pub use profile::{LimitWindow, ProfileError, StagePoint, TestKind, TestProfile, TestStage};
pub use report::{DetailRow, PairedRow, ReportRow, RunInfo, RunMetadata, RunReport};
pub use result::{TestResult, Verdict};
pub use sequencer::{SequencerState, StageSequencer};
