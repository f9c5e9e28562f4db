//! Region to endpoint mapping

/// DNS suffix for a region; China regions live under their own domain
pub fn domain_suffix(region: &str) -> &'static str {
    if region.starts_with("cn-") {
        "amazonaws.com.cn"
    } else {
        "amazonaws.com"
    }
}

/// Host serving the EC2 query API in `region`
pub fn ec2_host(region: &str) -> String {
    format!("ec2.{}.{}", region, domain_suffix(region))
}
