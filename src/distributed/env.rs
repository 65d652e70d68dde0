// ============================================================
// Distributed Bootstrap
// ============================================================
// Works out who this process is in the job and creates the
// process group it will reduce through.
//
// Two launch styles are understood:
//
//   Slurm     — SLURM_JOB_ID is set. Rank and world size come from
//               SLURM_PROCID / SLURM_NTASKS, the master address is
//               the first host of SLURM_NODELIST, and the
//               launcher-style variables (MASTER_ADDR, MASTER_PORT,
//               WORLD_SIZE, LOCAL_RANK, RANK) are exported so code
//               further down sees one uniform environment.
//
//   Launcher  — a multi-process launcher already exported RANK
//               and WORLD_SIZE.
//
// Resolution is a pure function over an env lookup; only
// setup_distributed touches the real process environment.

use std::{fmt, process::Command, str::FromStr, sync::Arc};

use crate::config::Config;
use crate::distributed::group::{ProcessGroup, SingleProcess};
use crate::error::{Error, Result};

const DEFAULT_MASTER_PORT: &str = "29500";

/// Collective backend requested by the launcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommBackend {
    #[default]
    Nccl,
    Gloo,
}

impl FromStr for CommBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "nccl" => Ok(Self::Nccl),
            "gloo" => Ok(Self::Gloo),
            other  => Err(Error::InvalidArgument(format!("unknown backend '{other}'"))),
        }
    }
}

impl fmt::Display for CommBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nccl => write!(f, "nccl"),
            Self::Gloo => write!(f, "gloo"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchMode {
    Slurm { job_id: String },
    Launcher,
}

/// Everything a rank knows about its place in the job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistContext {
    pub mode:         LaunchMode,
    pub rank:         usize,
    pub world_size:   usize,
    pub local_rank:   usize,
    /// Accelerator this rank is bound to: rank % num_gpus
    pub device_index: usize,
    pub master_addr:  Option<String>,
    pub master_port:  Option<String>,
}

impl DistContext {
    pub fn is_distributed(&self) -> bool {
        self.world_size > 1
    }

    pub fn is_main_process(&self) -> bool {
        self.rank == 0
    }
}

/// Result of resolving the environment: the context plus the
/// variables that must be exported for the rest of the process.
#[derive(Debug, Clone)]
pub struct EnvResolution {
    pub context: DistContext,
    pub exports: Vec<(&'static str, String)>,
}

/// Resolve rank, world size and rendezvous info.
///
/// `lookup` reads an environment variable, `first_host` turns a
/// Slurm node list into the master host name.
pub fn resolve_env<L, H>(
    lookup:     L,
    port:       Option<u16>,
    num_gpus:   usize,
    first_host: H,
) -> Result<EnvResolution>
where
    L: Fn(&str) -> Option<String>,
    H: Fn(&str) -> Result<String>,
{
    if num_gpus == 0 {
        return Err(Error::InvalidArgument("num_gpus must be at least 1".to_string()));
    }

    if let Some(job_id) = lookup("SLURM_JOB_ID") {
        let rank       = parse_var(&lookup, "SLURM_PROCID")?;
        let world_size = parse_var(&lookup, "SLURM_NTASKS")?;
        let node_list  = lookup("SLURM_NODELIST").ok_or(Error::MissingEnv("SLURM_NODELIST"))?;

        let master_port = match port {
            Some(p) => p.to_string(),
            None    => lookup("MASTER_PORT").unwrap_or_else(|| DEFAULT_MASTER_PORT.to_string()),
        };
        let master_addr = match lookup("MASTER_ADDR") {
            Some(addr) => addr,
            None       => first_host(&node_list)?,
        };
        let local_rank = rank % num_gpus;

        let exports = vec![
            ("MASTER_PORT", master_port.clone()),
            ("MASTER_ADDR", master_addr.clone()),
            ("WORLD_SIZE", world_size.to_string()),
            ("LOCAL_RANK", local_rank.to_string()),
            ("RANK", rank.to_string()),
        ];

        let context = DistContext {
            mode: LaunchMode::Slurm { job_id },
            rank,
            world_size,
            local_rank,
            device_index: rank % num_gpus,
            master_addr: Some(master_addr),
            master_port: Some(master_port),
        };
        return Ok(EnvResolution { context, exports });
    }

    let rank       = parse_var(&lookup, "RANK")?;
    let world_size = parse_var(&lookup, "WORLD_SIZE")?;
    let local_rank = match lookup("LOCAL_RANK") {
        Some(_) => parse_var(&lookup, "LOCAL_RANK")?,
        None    => rank % num_gpus,
    };

    let context = DistContext {
        mode: LaunchMode::Launcher,
        rank,
        world_size,
        local_rank,
        device_index: rank % num_gpus,
        master_addr: lookup("MASTER_ADDR"),
        master_port: lookup("MASTER_PORT"),
    };
    Ok(EnvResolution { context, exports: Vec::new() })
}

fn parse_var<L>(lookup: &L, var: &'static str) -> Result<usize>
where
    L: Fn(&str) -> Option<String>,
{
    let value = lookup(var).ok_or(Error::MissingEnv(var))?;
    value
        .trim()
        .parse()
        .map_err(|_| Error::InvalidEnv { var, value })
}

/// First host of a Slurm node list, asking `scontrol` first and
/// expanding the compressed syntax locally when it is unavailable.
pub fn slurm_first_host(node_list: &str) -> Result<String> {
    match Command::new("scontrol").args(["show", "hostname", node_list]).output() {
        Ok(out) if out.status.success() => {
            let stdout = String::from_utf8_lossy(&out.stdout);
            if let Some(host) = stdout.lines().map(str::trim).find(|l| !l.is_empty()) {
                return Ok(host.to_string());
            }
        }
        Ok(out) => tracing::warn!("scontrol exited with {}; expanding node list locally", out.status),
        Err(e)  => tracing::warn!("scontrol unavailable ({e}); expanding node list locally"),
    }

    first_host_in_nodelist(node_list).ok_or(Error::InvalidEnv {
        var:   "SLURM_NODELIST",
        value: node_list.to_string(),
    })
}

/// Expand the first entry of a compressed host list:
/// `gpu[03-05,09],cpu1` → `gpu03`.
pub fn first_host_in_nodelist(node_list: &str) -> Option<String> {
    let s = node_list.trim();

    // first top-level entry; commas inside brackets separate ranges
    let mut depth = 0usize;
    let mut end   = s.len();
    for (i, c) in s.char_indices() {
        match c {
            '['               => depth += 1,
            ']'               => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                end = i;
                break;
            }
            _ => {}
        }
    }
    let entry = &s[..end];

    let Some(open) = entry.find('[') else {
        return (!entry.is_empty()).then(|| entry.to_string());
    };
    let close  = open + entry[open..].find(']')?;
    let prefix = &entry[..open];
    let suffix = &entry[close + 1..];
    let first  = entry[open + 1..close].split(',').next()?.split('-').next()?.trim();

    (!first.is_empty()).then(|| format!("{prefix}{first}{suffix}"))
}

/// A resolved rank together with the group it reduces through
pub struct Distributed {
    pub context: DistContext,
    pub group:   Arc<dyn ProcessGroup>,
}

/// Bootstrap this process: resolve the environment, export the
/// launcher variables, bind a device and create the process group.
pub fn setup_distributed(
    cfg:     &Config,
    backend: CommBackend,
    port:    Option<u16>,
) -> Result<Distributed> {
    let resolution = resolve_env(
        |var| std::env::var(var).ok(),
        port,
        cfg.device.num_gpus,
        slurm_first_host,
    )?;

    for (var, value) in &resolution.exports {
        std::env::set_var(var, value);
    }

    let context = resolution.context;
    tracing::info!(
        "Rank {}/{} ({:?}) bound to device {}, master {}:{}",
        context.rank,
        context.world_size,
        context.mode,
        context.device_index,
        context.master_addr.as_deref().unwrap_or("-"),
        context.master_port.as_deref().unwrap_or("-"),
    );

    let group = init_process_group(backend, context.rank, context.world_size)?;
    Ok(Distributed { context, group })
}

/// Create the process group for `(rank, world_size)`.
///
/// A one-process world needs no transport. Larger worlds need a
/// cluster transport for `backend`, which this build does not link.
pub fn init_process_group(
    backend:    CommBackend,
    rank:       usize,
    world_size: usize,
) -> Result<Arc<dyn ProcessGroup>> {
    if world_size == 0 || rank >= world_size {
        return Err(Error::InvalidArgument(format!(
            "rank {rank} is outside a world of size {world_size}"
        )));
    }

    if world_size == 1 {
        tracing::debug!("Single-process group ({backend} requested)");
        return Ok(Arc::new(SingleProcess));
    }

    Err(Error::BackendUnavailable { backend: backend.to_string(), world_size })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn no_scontrol(list: &str) -> Result<String> {
        first_host_in_nodelist(list).ok_or(Error::MissingEnv("SLURM_NODELIST"))
    }

    #[test]
    fn test_slurm_resolution_exports_launcher_vars() {
        let vars = env(&[
            ("SLURM_JOB_ID", "4242"),
            ("SLURM_PROCID", "5"),
            ("SLURM_NTASKS", "8"),
            ("SLURM_NODELIST", "gpu[03-04]"),
        ]);
        let r = resolve_env(|k| vars.get(k).cloned(), None, 4, no_scontrol).unwrap();

        assert_eq!(r.context.mode, LaunchMode::Slurm { job_id: "4242".into() });
        assert_eq!(r.context.rank, 5);
        assert_eq!(r.context.world_size, 8);
        assert_eq!(r.context.local_rank, 1);
        assert_eq!(r.context.device_index, 1);

        let exported: HashMap<_, _> = r.exports.into_iter().collect();
        assert_eq!(exported["MASTER_PORT"], "29500");
        assert_eq!(exported["MASTER_ADDR"], "gpu03");
        assert_eq!(exported["WORLD_SIZE"], "8");
        assert_eq!(exported["LOCAL_RANK"], "1");
        assert_eq!(exported["RANK"], "5");
    }

    #[test]
    fn test_slurm_port_precedence() {
        let vars = env(&[
            ("SLURM_JOB_ID", "1"),
            ("SLURM_PROCID", "0"),
            ("SLURM_NTASKS", "2"),
            ("SLURM_NODELIST", "n1"),
            ("MASTER_PORT", "30000"),
            ("MASTER_ADDR", "head"),
        ]);

        let kept = resolve_env(|k| vars.get(k).cloned(), None, 1, no_scontrol).unwrap();
        assert_eq!(kept.context.master_port.as_deref(), Some("30000"));
        assert_eq!(kept.context.master_addr.as_deref(), Some("head"));

        let explicit = resolve_env(|k| vars.get(k).cloned(), Some(31000), 1, no_scontrol).unwrap();
        assert_eq!(explicit.context.master_port.as_deref(), Some("31000"));
    }

    #[test]
    fn test_launcher_resolution() {
        let vars = env(&[("RANK", "3"), ("WORLD_SIZE", "4")]);
        let r = resolve_env(|k| vars.get(k).cloned(), None, 2, no_scontrol).unwrap();

        assert_eq!(r.context.mode, LaunchMode::Launcher);
        assert_eq!(r.context.rank, 3);
        assert_eq!(r.context.local_rank, 1);
        assert_eq!(r.context.device_index, 1);
        assert!(r.exports.is_empty());
        assert!(r.context.is_distributed());
        assert!(!r.context.is_main_process());
    }

    #[test]
    fn test_missing_and_invalid_vars() {
        let empty = env(&[]);
        assert!(matches!(
            resolve_env(|k| empty.get(k).cloned(), None, 1, no_scontrol),
            Err(Error::MissingEnv("RANK"))
        ));

        let bad = env(&[("RANK", "zero"), ("WORLD_SIZE", "1")]);
        assert!(matches!(
            resolve_env(|k| bad.get(k).cloned(), None, 1, no_scontrol),
            Err(Error::InvalidEnv { var: "RANK", .. })
        ));
    }

    #[test]
    fn test_first_host_in_nodelist() {
        assert_eq!(first_host_in_nodelist("node07").as_deref(), Some("node07"));
        assert_eq!(first_host_in_nodelist("gpu[03-05,09],cpu1").as_deref(), Some("gpu03"));
        assert_eq!(first_host_in_nodelist("a1,b[2-3]").as_deref(), Some("a1"));
        assert_eq!(first_host_in_nodelist("rack[7,9]-ib").as_deref(), Some("rack7-ib"));
        assert_eq!(first_host_in_nodelist(""), None);
    }

    #[test]
    fn test_init_process_group() {
        let group = init_process_group(CommBackend::Nccl, 0, 1).unwrap();
        assert_eq!(group.world_size(), 1);

        assert!(matches!(
            init_process_group(CommBackend::Gloo, 0, 4),
            Err(Error::BackendUnavailable { world_size: 4, .. })
        ));
        assert!(init_process_group(CommBackend::Nccl, 2, 2).is_err());
    }

    #[test]
    fn test_backend_parsing() {
        assert_eq!("NCCL".parse::<CommBackend>().unwrap(), CommBackend::Nccl);
        assert_eq!("gloo".parse::<CommBackend>().unwrap(), CommBackend::Gloo);
        assert!("mpi".parse::<CommBackend>().is_err());
    }
}
