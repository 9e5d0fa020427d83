//! Built-in prompt templates for `start-agents-with-prompt`.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptTemplate {
    pub title: &'static str,
    pub description: &'static str,
    pub prompt: &'static str,
}

const TEAM: &str = "You are a team of Azure cost consultants: a Planner who breaks the task into steps, \
a Coder who writes and runs the Azure CLI or Python needed to collect data, a Critic who reviews \
every finding and reports a confidence score, and a User Proxy who executes code and relays \
questions to the user.";

const OUTPUT: &str = "Write the final recommendations to recommendations.csv with the columns \
Resource,ResourceGroup,CurrentSku,RecommendedAction,EstimatedMonthlySavings, for example:\n\
Resource,ResourceGroup,CurrentSku,RecommendedAction,EstimatedMonthlySavings\n\
vm-web-01,rg-prod,Standard_D8s_v3,Resize to Standard_D4s_v3,142.00";

const TEMPLATES: [PromptTemplate; 3] = [
    PromptTemplate {
        title: "Optimize Virtual Machines Cost",
        description: "Find idle or oversized virtual machines and suggest resizing, shutdown schedules, or reservations.",
        prompt: "Review every virtual machine in the subscription. Use the last 30 days of CPU and memory \
metrics to find machines that are idle or oversized, and propose a cheaper SKU, an auto-shutdown \
schedule, or a reserved instance for each one.",
    },
    PromptTemplate {
        title: "Analyze Storage Accounts",
        description: "Check storage accounts for cold data, redundant replication, and unused containers.",
        prompt: "Review every storage account in the subscription. Identify blobs that can move to the \
cool or archive tier, accounts whose replication level is higher than needed, and empty or \
unused containers.",
    },
    PromptTemplate {
        title: "Optimize Disk Usage",
        description: "Find unattached managed disks, over-provisioned premium disks, and stale snapshots.",
        prompt: "Review every managed disk and snapshot in the subscription. List unattached disks, \
premium disks whose IOPS usage fits a standard tier, and snapshots older than 90 days.",
    },
];

/// All built-in templates, in display order.
pub fn templates() -> &'static [PromptTemplate] {
    &TEMPLATES
}

/// Case-insensitive lookup by title.
pub fn find(title: &str) -> Option<&'static PromptTemplate> {
    let title = title.trim();
    TEMPLATES.iter().find(|t| t.title.eq_ignore_ascii_case(title))
}

impl PromptTemplate {
    /// The full prompt sent to the backend: team roles, the task, and the expected CSV output.
    pub fn full_prompt(&self) -> String {
        format!("{}\n\n{}\n\n{}", TEAM, self.prompt, OUTPUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_templates_in_order() {
        let titles: Vec<_> = templates().iter().map(|t| t.title).collect();
        assert_eq!(
            titles,
            vec![
                "Optimize Virtual Machines Cost",
                "Analyze Storage Accounts",
                "Optimize Disk Usage"
            ]
        );
    }

    #[test]
    fn find_ignores_case() {
        let t = find("analyze storage accounts").unwrap();
        assert_eq!(t.title, "Analyze Storage Accounts");
        assert!(find("Delete everything").is_none());
    }

    #[test]
    fn full_prompt_asks_for_tabular_output() {
        let p = find("Optimize Disk Usage").unwrap().full_prompt();
        assert!(p.contains("managed disk"));
        assert!(p.contains("recommendations.csv"));
        assert!(crate::classify::csv::looks_tabular(OUTPUT.split_once(":\n").unwrap().1));
    }
}
