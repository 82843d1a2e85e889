//! Naming conventions and constants of the pod compiler
//!
//! Everything here is compatibility-critical: resolvers, the coordinator,
//! and the server all key off these names, paths, and env vars.

/// Name prefix marking a stage-authored container as a sidecar
pub const WORKLOAD_SIDECAR_PREFIX: &str = "sc-";
/// Name of the coordinator sidecar container
pub const COORDINATOR_CONTAINER_NAME: &str = "coordinator";
/// Name prefix of input resolver init containers
pub const INPUT_CONTAINER_PREFIX: &str = "input-";
/// Name prefix of output resolver containers
pub const OUTPUT_CONTAINER_PREFIX: &str = "output-";

/// Volume name of the run's common PVC
pub const COMMON_PV_VOLUME: &str = "common-pv";
/// Volume name of the emptyDir shared by coordinator and resolvers
pub const COORDINATOR_SHARED_VOLUME: &str = "coordinator-shared";
/// Volume name of the container socket host path
pub const DOCKER_SOCK_VOLUME: &str = "docker-sock";
/// Volume name of the registry credentials projection
pub const DOCKER_CONFIG_JSON_VOLUME: &str = "docker-config-json";

/// Host path of the container socket
pub const DOCKER_SOCK_PATH: &str = "/var/run/docker.sock";
/// File name of the registry config inside its secret
pub const DOCKER_CONFIG_JSON_FILE: &str = "config.json";
/// Mount path of the registry config in image resolvers
pub const DOCKER_CONFIG_PATH: &str = "/root/.docker";

/// Workspace mount path inside resolver containers
pub const RESOLVER_WORKSPACE_PATH: &str = "/workspace";
/// Data directory inside resolver containers
pub const RESOLVER_DATA_PATH: &str = "/workspace/data";
/// Notify directory inside output resolvers; the coordinator signals
/// completion by writing here
pub const RESOLVER_NOTIFY_PATH: &str = "/workspace/notify";
/// Subdirectory of the shared volume backing the notify directory
pub const RESOLVER_NOTIFY_DIR: &str = "notify";

/// Mount path of the shared volume inside the coordinator
pub const COORDINATOR_RESOLVER_PATH: &str = "/workspace/resolvers";
/// Mount path of the stage artifact directory inside the coordinator
pub const COORDINATOR_ARTIFACTS_PATH: &str = "/workspace/artifacts";
/// Stage workspace mount path inside workload containers
pub const STAGE_WORKSPACE_PATH: &str = "/workspace/stage";

/// Label marking a pod as workflow-owned
pub const LABEL_WORKFLOW: &str = "cyclone.dev/workflow";
/// Annotation carrying the workflow run name
pub const ANNOTATION_WORKFLOWRUN: &str = "cyclone.dev/workflowrun";
/// Annotation carrying the stage name
pub const ANNOTATION_STAGE: &str = "cyclone.dev/stage";
/// Annotation carrying the namespace the run's resources live in
pub const ANNOTATION_META_NAMESPACE: &str = "cyclone.dev/meta-namespace";

/// Env var carrying the workflow run name
pub const ENV_WORKFLOWRUN_NAME: &str = "WORKFLOWRUN_NAME";
/// Env var carrying the stage name
pub const ENV_STAGE_NAME: &str = "STAGE_NAME";
/// Env var carrying the pod name (coordinator)
pub const ENV_POD_NAME: &str = "POD_NAME";
/// Env var carrying the execution namespace (coordinator)
pub const ENV_NAMESPACE: &str = "NAMESPACE";
/// Env var carrying the workload container name (coordinator)
pub const ENV_WORKLOAD_CONTAINER_NAME: &str = "WORKLOAD_CONTAINER_NAME";
/// Env var carrying the server address (coordinator)
pub const ENV_CYCLONE_SERVER_ADDR: &str = "CYCLONE_SERVER_ADDR";
/// Env var carrying the JSON-serialized stage (coordinator)
pub const ENV_STAGE_INFO: &str = "STAGE_INFO";
/// Env var carrying the JSON-serialized workflow run (coordinator)
pub const ENV_WORKFLOWRUN_INFO: &str = "WORKFLOWRUN_INFO";
/// Env var carrying the JSON-serialized output resources (coordinator)
pub const ENV_OUTPUT_RESOURCES_INFO: &str = "OUTPUT_RESOURCES_INFO";

/// Resolver argument to pull an input resource
pub const RESOURCE_PULL_COMMAND: &str = "pull";
/// Resolver argument to push an output resource
pub const RESOURCE_PUSH_COMMAND: &str = "push";

/// Pod name for a stage of a workflow
pub fn pod_name(workflow: &str, stage: &str) -> String {
    format!("{workflow}-{stage}")
}

/// Name of the Nth input resolver init container (1-indexed)
pub fn input_container_name(index: usize) -> String {
    format!("{INPUT_CONTAINER_PREFIX}{index}")
}

/// Name of the Nth output resolver container (1-indexed)
pub fn output_container_name(index: usize) -> String {
    format!("{OUTPUT_CONTAINER_PREFIX}{index}")
}

/// Volume name proposed for an input resource's persistent PVC
pub fn input_resource_volume_name(resource: &str) -> String {
    format!("input-rsc-{resource}")
}

/// Volume name proposed for an output resource's persistent PVC
pub fn output_resource_volume_name(resource: &str) -> String {
    format!("output-rsc-{resource}")
}

/// Volume name of the per-resource emptyDir used without a common PVC
pub fn resource_volume_name(resource: &str) -> String {
    format!("rsc-{resource}")
}

/// Common-PVC subpath staging a non-persistent resource for a run
pub fn resource_path(run: &str, resource: &str) -> String {
    format!("resources/{run}/{resource}")
}

/// Common-PVC subpath holding one output artifact of a run
pub fn artifact_source_path(run: &str, stage: &str, artifact: &str) -> String {
    format!("artifacts/{run}/{stage}/{artifact}")
}

/// Common-PVC subpath holding a stage's artifacts for a run
pub fn artifacts_path(run: &str, stage: &str) -> String {
    format!("artifacts/{run}/{stage}")
}

/// Common-PVC subpath of a stage's scratch workspace for a run
pub fn stage_path(run: &str, stage: &str) -> String {
    format!("stages/{run}/{stage}")
}

/// Last path segment, ignoring trailing slashes
pub fn basename(path: &str) -> &str {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(path)
}

/// Container selector used when applying per-container mutations
pub type ContainerSelector = fn(&str) -> bool;

/// True for the workload containers of a stage: everything that is not a
/// user sidecar, an output resolver, or the coordinator
pub fn only_workload(name: &str) -> bool {
    !name.starts_with(WORKLOAD_SIDECAR_PREFIX)
        && !name.starts_with(OUTPUT_CONTAINER_PREFIX)
        && name != COORDINATOR_CONTAINER_NAME
}

/// True for stage-authored containers (workload plus user sidecars),
/// excluding the system containers the compiler appends
pub fn only_custom_container(name: &str) -> bool {
    !name.starts_with(OUTPUT_CONTAINER_PREFIX) && name != COORDINATOR_CONTAINER_NAME
}

/// Selects every container
pub fn all_containers(_name: &str) -> bool {
    true
}
