use std::fmt::{self, Display};

use sitegate_lib::ratelimit::HostStatsMap;

/// Per-host table printed after all URLs were fetched
pub(crate) struct HostStatsTable(pub(crate) HostStatsMap);

impl Display for HostStatsTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return Ok(());
        }

        writeln!(f)?;
        writeln!(f, "Per-host statistics")?;
        writeln!(f, "{}", "─".repeat(60))?;

        let sorted_hosts = self.0.sorted();
        let hostname_width = sorted_hosts
            .iter()
            .map(|(hostname, _)| hostname.len())
            .max()
            .unwrap_or(0)
            .max(8)
            + 2;

        for (hostname, stats) in sorted_hosts {
            let longest = stats.longest_wait.as_millis();
            writeln!(
                f,
                "{hostname:<hostname_width$} │ {} │ longest wait: {longest}ms",
                stats.summary()
            )?;
        }

        Ok(())
    }
}
