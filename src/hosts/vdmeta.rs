//! vdmeta.com: vitamin D.

use super::{ChartSpec, GroupSource, HostProfile};

pub(super) fn profile() -> HostProfile {
    HostProfile {
        hostname: "vdmeta.com",
        studies_url: "https://c19vitamind.com",
        inclusion_selector: "#fig_plotdfp .infolayer .annotation a tspan, #fig_fps .infolayer .annotation a tspan",
        charts: vec![
            ChartSpec::forest("#fig_plotdfp"),
            ChartSpec::forest("#fig_fps"),
            ChartSpec::bar("#fig_plotnlevels"),
            ChartSpec::bar("#fig_plotlevels"),
            ChartSpec::box_plot(
                "#fig_plotsp",
                vec![
                    GroupSource::Chart("#fig_plotnlevels"),
                    GroupSource::Chart("#fig_plotlevels"),
                ],
            ),
            ChartSpec::bar("#fig_stageelp"),
            ChartSpec::forest("#fig_fp"),
            ChartSpec::forest_box_plot(
                ".section #fig_plotsp",
                "#fig_fp",
                4,
                vec![
                    GroupSource::ForestGroup("#fig_fp", 0),
                    GroupSource::ForestGroup("#fig_fp", 1),
                    GroupSource::ForestGroup("#fig_fp", 2),
                    GroupSource::AllForestGroups("#fig_fp"),
                ],
            ),
        ],
    }
}
