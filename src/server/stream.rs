use std::collections::VecDeque;
use std::time::Duration;

use futures::stream::{self, Stream};

use crate::errors::RunError;
use crate::run::RunRegistry;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

struct Tail {
    registry: RunRegistry,
    run_id: String,
    poll: Duration,
    offset: usize,
    started: bool,
    finished: bool,
    pending: VecDeque<String>,
}

/// Follow a run's log.
///
/// The first item is the whole log so far. After that the log is polled
/// every `poll` and each new line (with its newline) is one item. The
/// stream ends once the run is terminal, its notification outcome has been
/// logged, and everything up to that point has been yielded.
pub fn follow_log(
    registry: RunRegistry,
    run_id: &str,
    poll: Duration,
) -> Result<impl Stream<Item = String> + Send + 'static + use<>, RunError> {
    if !registry.contains(run_id) {
        return Err(RunError::NotFound(run_id.to_string()));
    }
    let tail = Tail {
        registry,
        run_id: run_id.to_string(),
        poll,
        offset: 0,
        started: false,
        finished: false,
        pending: VecDeque::new(),
    };

    Ok(stream::unfold(tail, |mut tail| async move {
        loop {
            if let Some(line) = tail.pending.pop_front() {
                return Some((line, tail));
            }
            if tail.finished {
                return None;
            }

            if !tail.started {
                tail.started = true;
                let (all, complete) = tail.registry.log_from(&tail.run_id, 0).ok()?;
                tail.offset = all.len();
                tail.finished = complete;
                return Some((all, tail));
            }

            tokio::time::sleep(tail.poll).await;
            let (new, complete) = tail.registry.log_from(&tail.run_id, tail.offset).ok()?;
            tail.offset += new.len();
            tail.pending
                .extend(new.split_inclusive('\n').map(String::from));
            tail.finished = complete;
        }
    }))
}
