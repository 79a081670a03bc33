pub mod deployment;

pub use deployment::{
    optimize_deployment, optimize_deployment_analysis, DeploymentConstraints, Objective,
    ScheduleCandidate, ScheduleResult, SearchSpace,
};
