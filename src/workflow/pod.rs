//! Stage-to-pod compiler
//!
//! [`PodBuilder`] compiles one stage of a workflow run into a concrete pod
//! spec through nine ordered passes. The order is load-bearing: later
//! passes mount into volumes created by earlier passes, and the final pass
//! fills requirements only where earlier passes (and the stage author) left
//! them unset.
//!
//! A builder is single-use: any pass failure aborts the build and the
//! partially built pod is discarded. Nothing is submitted to the cluster.

use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::api::core::v1::{
    Container, EmptyDirVolumeSource, EnvVar, HostPathVolumeSource, KeyToPath,
    PersistentVolumeClaimVolumeSource, Pod, PodSpec, ResourceRequirements, SecretVolumeSource,
    Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tracing::{debug, error, info};

use crate::client::ClusterClient;
use crate::config::{ControllerConfig, COORDINATOR_IMAGE};
use crate::crd::{
    ExecutionContext, PodWorkload, Resource, ResourceType, Stage, Workflow, WorkflowRun,
};
use crate::workflow::common::{
    all_containers, artifact_source_path, artifacts_path, basename, input_container_name,
    input_resource_volume_name, only_custom_container, only_workload, output_container_name,
    output_resource_volume_name, pod_name, resource_path, resource_volume_name, stage_path,
    ContainerSelector, ANNOTATION_META_NAMESPACE, ANNOTATION_STAGE, ANNOTATION_WORKFLOWRUN,
    COMMON_PV_VOLUME, COORDINATOR_ARTIFACTS_PATH, COORDINATOR_CONTAINER_NAME,
    COORDINATOR_RESOLVER_PATH, COORDINATOR_SHARED_VOLUME, DOCKER_CONFIG_JSON_FILE,
    DOCKER_CONFIG_JSON_VOLUME, DOCKER_CONFIG_PATH, DOCKER_SOCK_PATH, DOCKER_SOCK_VOLUME,
    ENV_CYCLONE_SERVER_ADDR, ENV_NAMESPACE, ENV_OUTPUT_RESOURCES_INFO, ENV_POD_NAME,
    ENV_STAGE_INFO, ENV_STAGE_NAME, ENV_WORKFLOWRUN_INFO, ENV_WORKFLOWRUN_NAME,
    ENV_WORKLOAD_CONTAINER_NAME, LABEL_WORKFLOW, RESOLVER_DATA_PATH, RESOLVER_NOTIFY_DIR,
    RESOLVER_NOTIFY_PATH, RESOLVER_WORKSPACE_PATH, RESOURCE_PULL_COMMAND, RESOURCE_PUSH_COMMAND,
    STAGE_WORKSPACE_PATH, WORKLOAD_SIDECAR_PREFIX,
};
use crate::workflow::params::{ParameterResolver, RefResolver};
use crate::workflow::template;
use crate::{Error, Result};

/// Execution context of a run: the run's own when set, the operator default
/// otherwise
pub fn execution_context(run: &WorkflowRun, config: &ControllerConfig) -> ExecutionContext {
    run.spec
        .execution_context
        .clone()
        .unwrap_or_else(|| config.execution_context.clone())
}

/// Compiles one stage of a workflow run into a pod spec
pub struct PodBuilder {
    client: Arc<dyn ClusterClient>,
    config: Arc<ControllerConfig>,
    params: ParameterResolver,
    workflow: Workflow,
    run: WorkflowRun,
    stage_name: String,
    stage: Option<Stage>,
    pod: Pod,
    /// PVC name -> volume name; one volume per distinct PVC
    pvc_volumes: BTreeMap<String, String>,
    execution_context: ExecutionContext,
    output_resources: Vec<Resource>,
}

impl PodBuilder {
    /// Create a builder for one stage of a run
    pub fn new(
        client: Arc<dyn ClusterClient>,
        config: Arc<ControllerConfig>,
        refs: Arc<dyn RefResolver>,
        workflow: Workflow,
        run: WorkflowRun,
        stage_name: impl Into<String>,
    ) -> Self {
        let execution_context = execution_context(&run, &config);
        Self {
            client,
            config,
            params: ParameterResolver::new(refs),
            workflow,
            run,
            stage_name: stage_name.into(),
            stage: None,
            pod: Pod::default(),
            pvc_volumes: BTreeMap::new(),
            execution_context,
            output_resources: Vec::new(),
        }
    }

    /// Run all nine passes in order and return the compiled pod
    pub async fn build(mut self) -> Result<Pod> {
        self.prepare().await?;
        self.resolve_arguments().await?;
        self.create_volumes()?;
        self.resolve_input_resources().await?;
        self.resolve_output_resources().await?;
        self.resolve_input_artifacts().await?;
        self.add_volume_mounts();
        self.add_coordinator()?;
        self.inject_envs();
        self.apply_resource_requirements();
        self.apply_service_account();

        info!(
            stage = %self.stage_name,
            pod = self.pod.metadata.name.as_deref().unwrap_or_default(),
            "Stage compiled"
        );
        Ok(self.pod)
    }

    /// Pass 1: fetch and validate the stage, initialize pod metadata
    pub async fn prepare(&mut self) -> Result<()> {
        let stage = self
            .client
            .get_stage(self.origin_namespace(), &self.stage_name)
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    Error::not_found("stage", self.stage_name.clone())
                } else {
                    e
                }
            })?;

        let workload = stage.spec.pod.as_ref().ok_or_else(|| {
            Error::validation(format!(
                "pod must be defined in stage spec, stage: {}",
                self.stage_name
            ))
        })?;

        // Only one workload container supported; everything else must be
        // marked as a sidecar by the name prefix.
        let workload_containers = workload
            .spec
            .containers
            .iter()
            .filter(|c| !c.name.starts_with(WORKLOAD_SIDECAR_PREFIX))
            .count();
        if workload_containers != 1 {
            return Err(Error::validation(format!(
                "exactly one workload container expected in stage '{}', found {}; \
                 sidecars must use the '{}' name prefix",
                self.stage_name, workload_containers, WORKLOAD_SIDECAR_PREFIX
            )));
        }

        let workflow_name = self
            .workflow
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| Error::validation("workflow name not set"))?;

        let mut labels = BTreeMap::new();
        labels.insert(LABEL_WORKFLOW.to_string(), "true".to_string());

        let mut annotations = BTreeMap::new();
        annotations.insert(
            ANNOTATION_WORKFLOWRUN.to_string(),
            self.run_name().to_string(),
        );
        annotations.insert(ANNOTATION_STAGE.to_string(), self.stage_name.clone());
        annotations.insert(
            ANNOTATION_META_NAMESPACE.to_string(),
            self.origin_namespace().to_string(),
        );

        self.pod.metadata = ObjectMeta {
            name: Some(pod_name(workflow_name, &self.stage_name)),
            namespace: Some(self.execution_context.namespace.clone()),
            labels: Some(labels),
            annotations: Some(annotations),
            ..ObjectMeta::default()
        };
        self.stage = Some(stage);
        Ok(())
    }

    /// Pass 2: resolve parameters, render the pod template, pin the restart
    /// policy
    pub async fn resolve_arguments(&mut self) -> Result<()> {
        let stage = self.stage()?;
        let parameters = self
            .params
            .stage_parameters(stage, &self.run, &self.stage_name)
            .await?;
        debug!(stage = %self.stage_name, count = parameters.len(), "Parameters collected");

        let workload = self.pod_workload()?;
        let mut rendered = serde_json::to_value(&workload.spec)
            .map_err(|e| Error::decode(format!("stage '{}' pod spec: {e}", self.stage_name)))?;
        template::render_params(&mut rendered, &parameters);
        let mut spec: PodSpec = serde_json::from_value(rendered).map_err(|e| {
            Error::decode(format!(
                "stage '{}' pod spec after templating: {e}",
                self.stage_name
            ))
        })?;

        spec.restart_policy = Some("Never".to_string());
        self.pod.spec = Some(spec);
        Ok(())
    }

    /// Pass 3: create the shared, PVC, socket, and registry volumes
    pub fn create_volumes(&mut self) -> Result<()> {
        // emptyDir shared between the coordinator and output resolvers.
        self.push_volume(Volume {
            name: COORDINATOR_SHARED_VOLUME.to_string(),
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Volume::default()
        });

        let pvc = self.execution_context.pvc.clone();
        if !pvc.is_empty() {
            let volume = self.create_pvc_volume(COMMON_PV_VOLUME, &pvc);
            if volume != COMMON_PV_VOLUME {
                error!(volume = %volume, pvc = %pvc, "Another volume already exists for the PVC");
                return Err(Error::validation(format!(
                    "PVC '{pvc}' already bound to volume '{volume}'"
                )));
            }
        }

        self.push_volume(Volume {
            name: DOCKER_SOCK_VOLUME.to_string(),
            host_path: Some(HostPathVolumeSource {
                path: DOCKER_SOCK_PATH.to_string(),
                type_: Some("Socket".to_string()),
            }),
            ..Volume::default()
        });

        if let Some(secret) = self.config.registry_secret.clone() {
            self.push_volume(Volume {
                name: DOCKER_CONFIG_JSON_VOLUME.to_string(),
                secret: Some(SecretVolumeSource {
                    secret_name: Some(secret),
                    items: Some(vec![KeyToPath {
                        key: DOCKER_CONFIG_JSON_FILE.to_string(),
                        path: DOCKER_CONFIG_JSON_FILE.to_string(),
                        mode: None,
                    }]),
                    ..SecretVolumeSource::default()
                }),
                ..Volume::default()
            });
        }

        Ok(())
    }

    /// Pass 4: one init resolver per input resource, data mounted into the
    /// workload containers
    pub async fn resolve_input_resources(&mut self) -> Result<()> {
        let inputs = self.pod_workload()?.inputs.resources.clone();
        let run_name = self.run_name().to_string();

        for (index, item) in inputs.iter().enumerate() {
            debug!(stage = %self.stage_name, resource = %item.name, "Resolving input resource");
            let resource = self.get_resource(&item.name).await?;

            // Backing volume and subpath: persistent binding wins, then the
            // common PVC, then a per-resource emptyDir.
            let mut volume_name = COMMON_PV_VOLUME.to_string();
            let mut sub_path = resource_path(&run_name, &item.name);
            if let Some(persistent) = resource.spec.persistent.clone() {
                sub_path = persistent.path;
                volume_name =
                    self.create_pvc_volume(&input_resource_volume_name(&item.name), &persistent.pvc);
            } else if self.execution_context.pvc.is_empty() {
                volume_name = resource_volume_name(&item.name);
                self.create_empty_dir_volume(&volume_name);
                sub_path.clear();
            }

            let image = self.resolver_image(&resource, &item.name)?;
            let env = self.resource_env(&resource, &item.name, true).await?;

            let container = Container {
                name: input_container_name(index + 1),
                image: Some(image),
                args: Some(vec![RESOURCE_PULL_COMMAND.to_string()]),
                env: Some(env),
                volume_mounts: Some(vec![VolumeMount {
                    name: volume_name.clone(),
                    mount_path: RESOLVER_WORKSPACE_PATH.to_string(),
                    sub_path: (!sub_path.is_empty()).then(|| sub_path.clone()),
                    ..VolumeMount::default()
                }]),
                image_pull_policy: Some(self.config.image_pull_policy.clone()),
                ..Container::default()
            };
            self.pod_spec_mut()
                .init_containers
                .get_or_insert_with(Vec::new)
                .push(container);

            // Mount the pulled data into the workload containers.
            let data_sub_path = if sub_path.is_empty() {
                "data".to_string()
            } else {
                format!("{sub_path}/data")
            };
            let mount_path = item.path.clone();
            for c in self
                .pod_spec_mut()
                .containers
                .iter_mut()
                .filter(|c| only_workload(&c.name))
            {
                c.volume_mounts.get_or_insert_with(Vec::new).push(VolumeMount {
                    name: volume_name.clone(),
                    mount_path: mount_path.clone(),
                    sub_path: Some(data_sub_path.clone()),
                    ..VolumeMount::default()
                });
            }
        }

        Ok(())
    }

    /// Pass 5: one push resolver per output resource, synchronized with the
    /// coordinator through the shared notify directory
    pub async fn resolve_output_resources(&mut self) -> Result<()> {
        let outputs = self.pod_workload()?.outputs.resources.clone();

        for (index, item) in outputs.iter().enumerate() {
            debug!(stage = %self.stage_name, resource = %item.name, "Resolving output resource");
            let resource = self.get_resource(&item.name).await?;
            self.output_resources.push(resource.clone());

            let image = self.resolver_image(&resource, &item.name)?;
            let env = self.resource_env(&resource, &item.name, false).await?;

            // The resolver blocks until the coordinator writes a notify file
            // into this mount.
            let mut mounts = vec![VolumeMount {
                name: COORDINATOR_SHARED_VOLUME.to_string(),
                mount_path: RESOLVER_NOTIFY_PATH.to_string(),
                sub_path: Some(RESOLVER_NOTIFY_DIR.to_string()),
                ..VolumeMount::default()
            }];

            if let Some(persistent) = resource.spec.persistent.clone() {
                let volume_name = self
                    .create_pvc_volume(&output_resource_volume_name(&item.name), &persistent.pvc);
                mounts.push(VolumeMount {
                    name: volume_name,
                    mount_path: format!("{}/{}", RESOLVER_DATA_PATH, basename(&persistent.path)),
                    sub_path: Some(persistent.path),
                    ..VolumeMount::default()
                });
            } else {
                mounts.push(VolumeMount {
                    name: COORDINATOR_SHARED_VOLUME.to_string(),
                    mount_path: RESOLVER_DATA_PATH.to_string(),
                    sub_path: Some(format!("resources/{}", item.name)),
                    ..VolumeMount::default()
                });
            }

            // Image resolvers talk to the container daemon and, when
            // configured, authenticate against the registry.
            if resource.spec.type_ == ResourceType::Image {
                mounts.push(VolumeMount {
                    name: DOCKER_SOCK_VOLUME.to_string(),
                    mount_path: DOCKER_SOCK_PATH.to_string(),
                    ..VolumeMount::default()
                });
                if self.config.registry_secret.is_some() {
                    mounts.push(VolumeMount {
                        name: DOCKER_CONFIG_JSON_VOLUME.to_string(),
                        mount_path: DOCKER_CONFIG_PATH.to_string(),
                        ..VolumeMount::default()
                    });
                }
            }

            let container = Container {
                name: output_container_name(index + 1),
                image: Some(image),
                args: Some(vec![RESOURCE_PUSH_COMMAND.to_string()]),
                env: Some(env),
                volume_mounts: Some(mounts),
                image_pull_policy: Some(self.config.image_pull_policy.clone()),
                ..Container::default()
            };
            self.pod_spec_mut().containers.push(container);
        }

        Ok(())
    }

    /// Pass 6: mount input artifacts from the common PVC into the workload
    /// containers
    pub async fn resolve_input_artifacts(&mut self) -> Result<()> {
        let artifacts = self.pod_workload()?.inputs.artifacts.clone();
        if self.execution_context.pvc.is_empty() {
            if !artifacts.is_empty() {
                return Err(Error::validation(format!(
                    "artifacts not supported when no PVC provided, but {} input artifacts found",
                    artifacts.len()
                )));
            }
            return Ok(());
        }
        if artifacts.is_empty() {
            return Ok(());
        }

        let workflow_name = self.workflow_name().to_string();
        let wf_stage = self
            .workflow
            .spec
            .stages
            .iter()
            .find(|s| s.name == self.stage_name)
            .cloned()
            .ok_or_else(|| {
                Error::validation(format!(
                    "stage '{}' not found in workflow '{}'",
                    self.stage_name, workflow_name
                ))
            })?;
        let run_name = self.run_name().to_string();

        for artifact in &artifacts {
            let source = wf_stage
                .artifacts
                .iter()
                .find(|b| b.name == artifact.name)
                .map(|b| b.source.clone())
                .ok_or_else(|| {
                    Error::validation(format!(
                        "input artifact '{}' not bound in workflow '{}'",
                        artifact.name, workflow_name
                    ))
                })?;
            let (source_stage, source_artifact) = source.split_once('/').ok_or_else(|| {
                Error::validation(format!(
                    "invalid artifact source '{source}', expected '<stage>/<artifact>'"
                ))
            })?;

            info!(artifact = %artifact.name, source = %source, "Mounting input artifact");
            let file_name = self.artifact_file_name(source_stage, source_artifact).await?;
            let sub_path = format!(
                "{}/{}",
                artifact_source_path(&run_name, source_stage, source_artifact),
                file_name
            );

            let mount_path = artifact.path.clone();
            for c in self
                .pod_spec_mut()
                .containers
                .iter_mut()
                .filter(|c| only_workload(&c.name))
            {
                c.volume_mounts.get_or_insert_with(Vec::new).push(VolumeMount {
                    name: COMMON_PV_VOLUME.to_string(),
                    mount_path: mount_path.clone(),
                    sub_path: Some(sub_path.clone()),
                    ..VolumeMount::default()
                });
            }
        }

        Ok(())
    }

    /// Pass 7: mount the stage workspace from the common PVC into the
    /// workload containers
    pub fn add_volume_mounts(&mut self) {
        if self.execution_context.pvc.is_empty() {
            return;
        }
        let sub_path = stage_path(self.run_name(), &self.stage_name);
        for c in self
            .pod
            .spec
            .get_or_insert_with(PodSpec::default)
            .containers
            .iter_mut()
            .filter(|c| only_workload(&c.name))
        {
            c.volume_mounts.get_or_insert_with(Vec::new).push(VolumeMount {
                name: COMMON_PV_VOLUME.to_string(),
                mount_path: STAGE_WORKSPACE_PATH.to_string(),
                sub_path: Some(sub_path.clone()),
                ..VolumeMount::default()
            });
        }
    }

    /// Pass 8: append the coordinator sidecar
    pub fn add_coordinator(&mut self) -> Result<()> {
        let stage = self.stage()?;
        let workload_container = self
            .pod_workload()?
            .spec
            .containers
            .iter()
            .find(|c| !c.name.starts_with(WORKLOAD_SIDECAR_PREFIX))
            .map(|c| c.name.clone())
            .unwrap_or_default();

        let stage_info = serde_json::to_string(stage)
            .map_err(|e| Error::decode(format!("serialize stage '{}': {e}", self.stage_name)))?;
        let run_info = serde_json::to_string(&self.run)
            .map_err(|e| Error::decode(format!("serialize workflow run: {e}")))?;
        let resources_info = serde_json::to_string(&self.output_resources)
            .map_err(|e| Error::decode(format!("serialize output resources: {e}")))?;

        let image = self
            .config
            .image(COORDINATOR_IMAGE)
            .ok_or_else(|| Error::validation("no coordinator image configured"))?
            .to_string();

        let env = vec![
            env_var(ENV_POD_NAME, self.pod.metadata.name.clone().unwrap_or_default()),
            env_var(ENV_NAMESPACE, self.execution_context.namespace.clone()),
            env_var(ENV_WORKLOAD_CONTAINER_NAME, workload_container),
            env_var(
                ENV_CYCLONE_SERVER_ADDR,
                self.config.cyclone_server_addr.clone(),
            ),
            env_var(ENV_STAGE_INFO, stage_info),
            env_var(ENV_WORKFLOWRUN_INFO, run_info),
            env_var(ENV_OUTPUT_RESOURCES_INFO, resources_info),
        ];

        let mut mounts = vec![
            VolumeMount {
                name: DOCKER_SOCK_VOLUME.to_string(),
                mount_path: DOCKER_SOCK_PATH.to_string(),
                ..VolumeMount::default()
            },
            VolumeMount {
                name: COORDINATOR_SHARED_VOLUME.to_string(),
                mount_path: COORDINATOR_RESOLVER_PATH.to_string(),
                ..VolumeMount::default()
            },
        ];
        if !self.execution_context.pvc.is_empty() {
            mounts.push(VolumeMount {
                name: COMMON_PV_VOLUME.to_string(),
                mount_path: COORDINATOR_ARTIFACTS_PATH.to_string(),
                sub_path: Some(artifacts_path(self.run_name(), &self.stage_name)),
                ..VolumeMount::default()
            });
        }

        let coordinator = Container {
            name: COORDINATOR_CONTAINER_NAME.to_string(),
            image: Some(image),
            env: Some(env),
            volume_mounts: Some(mounts),
            image_pull_policy: Some(self.config.image_pull_policy.clone()),
            ..Container::default()
        };
        self.pod_spec_mut().containers.push(coordinator);
        Ok(())
    }

    /// Pass 9a: inject the run and stage names into every container
    pub fn inject_envs(&mut self) {
        let run_name = self.run_name().to_string();
        let stage_name = self.stage_name.clone();
        let spec = self.pod.spec.get_or_insert_with(PodSpec::default);

        inject_env_pair(&mut spec.containers, &run_name, &stage_name);
        if let Some(init) = spec.init_containers.as_mut() {
            inject_env_pair(init, &run_name, &stage_name);
        }
    }

    /// Pass 9b: fill resource requirements where unset, stage values first,
    /// then workflow values (stage-authored containers only), then operator
    /// defaults (all containers)
    pub fn apply_resource_requirements(&mut self) {
        if let Some(requirements) = self.workflow.spec.resources.clone() {
            apply_requirements(
                &mut self.pod.spec.get_or_insert_with(PodSpec::default).containers,
                &requirements,
                only_custom_container,
            );
        }

        let defaults = self.config.default_resource_requirements.clone();
        let spec = self.pod.spec.get_or_insert_with(PodSpec::default);
        if let Some(init) = spec.init_containers.as_mut() {
            apply_requirements(init, &defaults, all_containers);
        }
        apply_requirements(&mut spec.containers, &defaults, all_containers);
    }

    /// Pass 9c: set the pod service account from operator config.
    ///
    /// The run's execution context drives namespace and PVC decisions only;
    /// the service account is operator policy and a run-supplied value is
    /// ignored.
    pub fn apply_service_account(&mut self) {
        let account = self.config.execution_context.service_account.clone();
        self.pod_spec_mut().service_account_name = (!account.is_empty()).then_some(account);
    }

    // ----- helpers -----

    /// Materialize a PVC volume under the proposed name, or return the name
    /// of the existing volume already bound to the PVC.
    fn create_pvc_volume(&mut self, proposed: &str, claim: &str) -> String {
        if let Some(existing) = self.pvc_volumes.get(claim) {
            return existing.clone();
        }

        self.push_volume(Volume {
            name: proposed.to_string(),
            persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                claim_name: claim.to_string(),
                read_only: None,
            }),
            ..Volume::default()
        });
        self.pvc_volumes
            .insert(claim.to_string(), proposed.to_string());
        proposed.to_string()
    }

    fn create_empty_dir_volume(&mut self, name: &str) {
        self.push_volume(Volume {
            name: name.to_string(),
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Volume::default()
        });
    }

    fn push_volume(&mut self, volume: Volume) {
        self.pod_spec_mut()
            .volumes
            .get_or_insert_with(Vec::new)
            .push(volume);
    }

    /// Resolver image: table lookup for built-in types, the resource's own
    /// resolver otherwise
    fn resolver_image(&self, resource: &Resource, name: &str) -> Result<String> {
        match resource.spec.type_.image_key() {
            Some(key) => self.config.image(key).map(str::to_string).ok_or_else(|| {
                Error::validation(format!(
                    "no resolver image configured for resource type '{}'",
                    resource.spec.type_
                ))
            }),
            None => resource.spec.resolver.clone().ok_or_else(|| {
                Error::validation(format!(
                    "resource '{}' of custom type '{}' has no resolver image",
                    name, resource.spec.type_
                ))
            }),
        }
    }

    /// Resolver environment: resource parameters overlaid with the run's
    /// per-resource overrides, references resolved; input resolvers also get
    /// the run name
    async fn resource_env(
        &self,
        resource: &Resource,
        name: &str,
        include_run_name: bool,
    ) -> Result<Vec<EnvVar>> {
        let mut values = BTreeMap::new();
        if include_run_name {
            values.insert(
                ENV_WORKFLOWRUN_NAME.to_string(),
                self.run_name().to_string(),
            );
        }
        for p in &resource.spec.parameters {
            values.insert(p.name.clone(), p.value.clone());
        }
        for o in &self.run.spec.resources {
            if o.name == name {
                for p in &o.parameters {
                    values.insert(p.name.clone(), p.value.clone());
                }
            }
        }

        let resolved = self.params.resolve_values(values).await?;
        Ok(resolved
            .into_iter()
            .map(|(name, value)| env_var(&name, value))
            .collect())
    }

    /// File name of an output artifact, from the source stage's declaration
    async fn artifact_file_name(&self, stage_name: &str, artifact_name: &str) -> Result<String> {
        let stage = self
            .client
            .get_stage(self.origin_namespace(), stage_name)
            .await
            .map_err(|e| {
                error!(stage = %stage_name, error = %e, "Get source stage failed");
                if e.is_not_found() {
                    Error::not_found("stage", stage_name.to_string())
                } else {
                    e
                }
            })?;

        stage
            .spec
            .pod
            .as_ref()
            .map(|p| p.outputs.artifacts.as_slice())
            .unwrap_or_default()
            .iter()
            .find(|a| a.name == artifact_name)
            .map(|a| basename(&a.path).to_string())
            .ok_or_else(|| {
                Error::validation(format!(
                    "output artifact '{artifact_name}' not found in stage '{stage_name}'"
                ))
            })
    }

    async fn get_resource(&self, name: &str) -> Result<Resource> {
        self.client
            .get_resource(self.origin_namespace(), name)
            .await
            .map_err(|e| {
                error!(resource = %name, error = %e, "Get resource failed");
                if e.is_not_found() {
                    Error::not_found("resource", name.to_string())
                } else {
                    e
                }
            })
    }

    fn stage(&self) -> Result<&Stage> {
        self.stage
            .as_ref()
            .ok_or_else(|| Error::validation("builder pass order violated: stage not prepared"))
    }

    fn pod_workload(&self) -> Result<&PodWorkload> {
        self.stage()?.spec.pod.as_ref().ok_or_else(|| {
            Error::validation(format!(
                "pod must be defined in stage spec, stage: {}",
                self.stage_name
            ))
        })
    }

    fn pod_spec_mut(&mut self) -> &mut PodSpec {
        self.pod.spec.get_or_insert_with(PodSpec::default)
    }

    fn origin_namespace(&self) -> &str {
        self.run.metadata.namespace.as_deref().unwrap_or("default")
    }

    fn run_name(&self) -> &str {
        self.run.metadata.name.as_deref().unwrap_or_default()
    }

    fn workflow_name(&self) -> &str {
        self.workflow.metadata.name.as_deref().unwrap_or_default()
    }
}

fn env_var(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.into()),
        value_from: None,
    }
}

fn inject_env_pair(containers: &mut [Container], run_name: &str, stage_name: &str) {
    for c in containers {
        let env = c.env.get_or_insert_with(Vec::new);
        for (name, value) in [(ENV_WORKFLOWRUN_NAME, run_name), (ENV_STAGE_NAME, stage_name)] {
            if !env.iter().any(|e| e.name == name) {
                env.push(env_var(name, value));
            }
        }
    }
}

/// Fill requirements into selected containers, never overwriting a key the
/// container already sets
fn apply_requirements(
    containers: &mut [Container],
    requirements: &ResourceRequirements,
    selector: ContainerSelector,
) {
    for c in containers.iter_mut().filter(|c| selector(&c.name)) {
        let resources = c.resources.get_or_insert_with(ResourceRequirements::default);

        if let Some(requests) = &requirements.requests {
            let target = resources.requests.get_or_insert_with(BTreeMap::new);
            for (k, v) in requests {
                target.entry(k.clone()).or_insert_with(|| v.clone());
            }
        }
        if let Some(limits) = &requirements.limits {
            let target = resources.limits.get_or_insert_with(BTreeMap::new);
            for (k, v) in limits {
                target.entry(k.clone()).or_insert_with(|| v.clone());
            }
        }
    }
}
