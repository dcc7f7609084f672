//! hcqmeta.com: hydroxychloroquine.

use super::{ChartSpec, GroupSource, HostProfile};

pub(super) fn profile() -> HostProfile {
    let early = || GroupSource::Chart("#fig_plotall").stage_contains("early");

    HostProfile {
        hostname: "hcqmeta.com",
        studies_url: "https://c19hcq.com",
        inclusion_selector: "#fig_plotall .infolayer .annotation-text a",
        charts: vec![
            ChartSpec::titled_forest(
                "#fig_fpearly",
                "All %s hydroxychloroquine COVID-19 early treatment studies",
            ),
            ChartSpec::forest("#fig_fp"),
            ChartSpec::titled_forest(
                "#fig_fpd",
                "All %s hydroxychloroquine COVID-19 mortality results",
            ),
            ChartSpec::titled_forest(
                "#fig_fph",
                "All %s hydroxychloroquine COVID-19 hospitalization results",
            ),
            ChartSpec::forest("#fig_fpre"),
            ChartSpec::bar("#fig_plotearly"),
            ChartSpec::bar("#fig_plotall"),
            ChartSpec::box_plot("#fig_plotsp", vec![early(), GroupSource::Chart("#fig_plotall")]),
            ChartSpec::bar("#fig_stageearly"),
            ChartSpec::bar("#fig_stagelate"),
            ChartSpec::bar("#fig_stageprep"),
            ChartSpec::bar("#fig_stagepep"),
            ChartSpec::bar("#fig_rct"),
            ChartSpec::bar("#fig_rcte"),
            ChartSpec::box_plot(
                ".nobreak #fig_plotsp",
                vec![
                    early(),
                    GroupSource::Chart("#fig_stagelate"),
                    GroupSource::Chart("#fig_stageprep"),
                    GroupSource::Chart("#fig_stagepep"),
                    GroupSource::Chart("#fig_plotall"),
                ],
            ),
            ChartSpec::forest("#fig_fpe"),
        ],
    }
}
