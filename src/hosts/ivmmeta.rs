//! ivmmeta.com: ivermectin.

use super::{ChartSpec, GroupSource, HostProfile};

pub(super) fn profile() -> HostProfile {
    let rct_free = || GroupSource::Chart("#fig_plotall").without(GroupSource::Chart("#fig_rct"));

    HostProfile {
        hostname: "ivmmeta.com",
        studies_url: "https://c19ivermectin.com",
        inclusion_selector: "#fig_fpall .infolayer .annotation a tspan",
        charts: vec![
            ChartSpec::forest("#fig_fpep"),
            ChartSpec::titled_forest("#fig_fpd", "All %s ivermectin COVID-19 mortality results"),
            ChartSpec::titled_forest(
                "#fig_fpm",
                "All %s ivermectin COVID-19 mechanical ventilation results",
            ),
            ChartSpec::titled_forest("#fig_fpi", "All %s ivermectin COVID-19 ICU results"),
            ChartSpec::titled_forest(
                "#fig_fph",
                "All %s ivermectin COVID-19 hospitalization results",
            ),
            ChartSpec::titled_forest("#fig_fpc", "All %s ivermectin COVID-19 case results"),
            ChartSpec::titled_forest(
                "#fig_fpv",
                "All %s ivermectin COVID-19 viral clearance results",
            ),
            ChartSpec::titled_forest("#fig_fpp", "All %s ivermectin COVID-19 peer reviewed trials"),
            ChartSpec::titled_forest(
                "#fig_fpr",
                "All %s ivermectin COVID-19 Randomized Controlled Trials",
            ),
            ChartSpec::titled_forest("#fig_fprd", "All %s ivermectin COVID-19 RCT mortality results"),
            ChartSpec::titled_forest(
                "#fig_fpe",
                "All %s ivermectin COVID-19 studies with exclusions",
            ),
            ChartSpec::bar("#fig_plotearly"),
            ChartSpec::bar("#fig_plotall"),
            ChartSpec::box_plot(
                "#fig_plotsp",
                vec![GroupSource::Chart("#fig_plotearly"), GroupSource::Chart("#fig_plotall")],
            ),
            ChartSpec::bar("#fig_stageearly"),
            ChartSpec::bar("#fig_stagelate"),
            ChartSpec::bar("#fig_stagepep"),
            ChartSpec::bar("#fig_rct"),
            ChartSpec::box_plot(
                "#fig_plotsprct",
                vec![GroupSource::Chart("#fig_rct"), rct_free()],
            ),
            ChartSpec::box_plot(
                "#fig_plotsprcte",
                vec![
                    GroupSource::Chart("#fig_rct").stage_is_not("late"),
                    rct_free().stage_is_not("late"),
                ],
            ),
            ChartSpec::bar("#fig_rcte"),
            ChartSpec::titled_forest("#fig_fpall", "All %s ivermectin COVID-19 studies"),
            ChartSpec::forest_box_plot(
                ".nobreak #fig_plotsp",
                "#fig_fpall",
                3,
                vec![
                    GroupSource::ForestGroup("#fig_fpall", 2),
                    GroupSource::ForestGroup("#fig_fpall", 0),
                    GroupSource::ForestGroup("#fig_fpall", 1),
                    GroupSource::AllForestGroups("#fig_fpall"),
                ],
            ),
        ],
    }
}
