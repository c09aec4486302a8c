use crate::{DesiredSpec, EngineError, PaymentTiming, Topology};

/// Shard counts the remote side accepts for cluster topology.
pub const ALLOWED_CLUSTER_SHARD_NUMS: [u32; 12] = [2, 4, 6, 8, 12, 16, 24, 32, 48, 64, 96, 128];

const ALLOWED_RESERVATION_LENGTHS: [u32; 12] = [1, 2, 3, 4, 5, 6, 7, 8, 9, 12, 24, 36];

fn fail(message: impl Into<String>) -> EngineError {
    EngineError::Validation(message.into())
}

/// Check a desired spec before any remote call is made.
///
/// This is the caller-input gate: everything rejected here would be
/// rejected remotely anyway, but catching it locally avoids burning a
/// mutation (and an idempotency token) on a request that cannot apply.
pub fn validate_spec(spec: &DesiredSpec) -> Result<(), EngineError> {
    let name = spec.instance_name.as_str();
    if name.is_empty() || name.chars().count() > 65 {
        return Err(fail("instance_name must be 1-65 characters"));
    }
    if !name.chars().next().is_some_and(|c| c.is_ascii_alphabetic()) {
        return Err(fail("instance_name must start with a letter"));
    }

    match &spec.topology {
        Topology::Cluster { shard_num } => {
            if !ALLOWED_CLUSTER_SHARD_NUMS.contains(shard_num) {
                return Err(fail(format!(
                    "shard_num {} not allowed for cluster topology (allowed: {:?})",
                    shard_num, ALLOWED_CLUSTER_SHARD_NUMS
                )));
            }
        }
        Topology::MasterSlave { node_type } => {
            if node_type.is_empty() {
                return Err(fail("node_type is required for master_slave topology"));
            }
        }
    }

    match spec.billing.payment_timing {
        PaymentTiming::Prepaid => {
            if let Some(reservation) = &spec.billing.reservation {
                if !ALLOWED_RESERVATION_LENGTHS.contains(&reservation.reservation_length) {
                    return Err(fail(format!(
                        "reservation_length {} not allowed (allowed: {:?})",
                        reservation.reservation_length, ALLOWED_RESERVATION_LENGTHS
                    )));
                }
                if reservation.reservation_time_unit != "Month" {
                    return Err(fail("reservation_time_unit must be \"Month\""));
                }
            }
        }
        PaymentTiming::Postpaid => {
            if spec.billing.auto_renew.is_some() {
                return Err(fail("auto_renew is only valid for Prepaid billing"));
            }
        }
    }

    if let Some(auto_renew) = &spec.billing.auto_renew {
        let valid = match auto_renew.time_unit.as_str() {
            "month" => (1..=9).contains(&auto_renew.time_length),
            "year" => (1..=3).contains(&auto_renew.time_length),
            _ => false,
        };
        if !valid {
            return Err(fail(
                "auto_renew must be 1-9 months or 1-3 years",
            ));
        }
    }

    if spec.purchase_count == 0 {
        return Err(fail("purchase_count must be at least 1"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AutoRenew, Billing, Reservation};

    fn cluster_spec(shard_num: u32) -> DesiredSpec {
        DesiredSpec::new("terraform-redis", Topology::Cluster { shard_num })
    }

    #[test]
    fn accepts_allowed_cluster_shard_counts() {
        for n in ALLOWED_CLUSTER_SHARD_NUMS {
            assert!(validate_spec(&cluster_spec(n)).is_ok(), "shard_num {}", n);
        }
    }

    #[test]
    fn rejects_disallowed_cluster_shard_counts() {
        for n in [0, 1, 3, 5, 130] {
            assert!(validate_spec(&cluster_spec(n)).is_err(), "shard_num {}", n);
        }
    }

    #[test]
    fn rejects_bad_names() {
        let mut spec = cluster_spec(2);
        spec.instance_name = String::new();
        assert!(validate_spec(&spec).is_err());

        spec.instance_name = "1-starts-with-digit".into();
        assert!(validate_spec(&spec).is_err());

        spec.instance_name = "x".repeat(66);
        assert!(validate_spec(&spec).is_err());
    }

    #[test]
    fn rejects_empty_node_type() {
        let spec = DesiredSpec::new(
            "redis-a",
            Topology::MasterSlave {
                node_type: String::new(),
            },
        );
        assert!(validate_spec(&spec).is_err());
    }

    #[test]
    fn rejects_auto_renew_on_postpaid() {
        let mut spec = cluster_spec(2);
        spec.billing.auto_renew = Some(AutoRenew {
            time_unit: "month".into(),
            time_length: 1,
        });
        assert!(validate_spec(&spec).is_err());
    }

    #[test]
    fn prepaid_reservation_bounds() {
        let mut spec = cluster_spec(2);
        spec.billing = Billing {
            payment_timing: PaymentTiming::Prepaid,
            reservation: Some(Reservation {
                reservation_length: 12,
                reservation_time_unit: "Month".into(),
            }),
            auto_renew: None,
        };
        assert!(validate_spec(&spec).is_ok());

        spec.billing.reservation = Some(Reservation {
            reservation_length: 10,
            reservation_time_unit: "Month".into(),
        });
        assert!(validate_spec(&spec).is_err());
    }
}
