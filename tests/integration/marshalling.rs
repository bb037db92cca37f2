//! Native values survive a trip through model-shaped JSON.

use chatfn::functions::{
    ArgumentMarshaller, ObjectDescriptor, ParameterDescriptor, ToolType, TypeDescriptor,
};
use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Priority {
    Low,
    High,
}

impl ToolType for Priority {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::enumeration("Priority", ["Low", "High"])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Leg {
    from: String,
    to: String,
    minutes: Option<u32>,
}

impl ToolType for Leg {
    fn descriptor() -> TypeDescriptor {
        ObjectDescriptor::new("Leg")
            .field::<String>("from")
            .field::<String>("to")
            .field::<Option<u32>>("minutes")
            .build()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Route {
    legs: Vec<Leg>,
    priority: Priority,
    tags: BTreeMap<String, i64>,
    departure: DateTime<Utc>,
    budget: Duration,
}

impl ToolType for Route {
    fn descriptor() -> TypeDescriptor {
        ObjectDescriptor::new("Route")
            .field::<Vec<Leg>>("legs")
            .field::<Priority>("priority")
            .field::<BTreeMap<String, i64>>("tags")
            .field::<DateTime<Utc>>("departure")
            .field::<Duration>("budget")
            .build()
    }
}

fn sample() -> Route {
    Route {
        legs: vec![
            Leg {
                from: "Moscow".into(),
                to: "Tver".into(),
                minutes: Some(150),
            },
            Leg {
                from: "Tver".into(),
                to: "Novgorod".into(),
                minutes: None,
            },
        ],
        priority: Priority::High,
        tags: BTreeMap::from([("tolls".to_string(), 2), ("stops".to_string(), -1)]),
        departure: Utc.with_ymd_and_hms(2024, 5, 1, 6, 30, 0).unwrap(),
        budget: Duration::from_secs(5400),
    }
}

#[test]
fn nested_values_round_trip() -> Result<()> {
    let route = sample();
    let matrix = vec![vec![1.5f64, -2.0], vec![], vec![0.25]];
    let arguments = serde_json::json!({
        "route": route,
        "matrix": matrix,
        "count": 3u8,
        "verbose": true,
    });
    let params = vec![
        ParameterDescriptor::new::<Route>("route"),
        ParameterDescriptor::new::<Vec<Vec<f64>>>("matrix"),
        ParameterDescriptor::new::<u8>("count"),
        ParameterDescriptor::new::<bool>("verbose"),
    ];

    let args = ArgumentMarshaller::marshal("plan", &arguments, &params, &[])?;

    assert_eq!(args.len(), 4);
    assert_eq!(args.get::<Route>(0)?, route);
    assert_eq!(args.get::<Vec<Vec<f64>>>(1)?, matrix);
    assert_eq!(args.get::<u8>(2)?, 3);
    assert!(args.get::<bool>(3)?);
    Ok(())
}

#[test]
fn model_style_inputs_are_normalized() -> Result<()> {
    // Arguments encoded as a string, clock-style duration, lowercase enum name.
    let arguments = serde_json::Value::String(
        serde_json::json!({
            "route": {
                "legs": [{"from": "A", "to": "B"}],
                "priority": "low",
                "tags": {},
                "departure": "2024-05-01T06:30:00Z",
                "budget": "01:30:00"
            }
        })
        .to_string(),
    );
    let params = vec![ParameterDescriptor::new::<Route>("route")];

    let args = ArgumentMarshaller::marshal("plan", &arguments, &params, &[])?;
    let route = args.get::<Route>(0)?;

    assert_eq!(route.priority, Priority::Low);
    assert_eq!(route.legs[0].minutes, None);
    assert_eq!(route.budget, Duration::from_secs(5400));
    assert_eq!(route.departure, sample().departure);
    Ok(())
}
